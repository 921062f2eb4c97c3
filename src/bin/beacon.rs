#![no_std]
#![no_main]

//! Beacon firmware
//!
//! Broadcasts an uptime counter as manufacturer data through the
//! advertisement channel, one new payload per second.

use defmt::*;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_nrf::{config::Config, interrupt};
use embassy_time::{Duration, Instant, Timer};
use nrf_comm_channels::ble::advertising::{AdvChannel, AdvParams, AdvType, AdvertisingConfig};
use nrf_comm_channels::ble::softdevice::SoftdeviceBroadcaster;
use nrf_comm_channels::{Channel, Message};
use nrf_softdevice::{raw, Config as SdConfig, Softdevice};
use panic_probe as _;

const UPDATE_INTERVAL: Duration = Duration::from_secs(1);

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting beacon");

    let mut nrf_config = Config::default();
    nrf_config.gpiote_interrupt_priority = interrupt::Priority::P2;
    nrf_config.time_interrupt_priority = interrupt::Priority::P2;
    let _peripherals = embassy_nrf::init(nrf_config);

    let sd_config = SdConfig {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: Default::default(),
        }),
        ..Default::default()
    };

    let sd = Softdevice::enable(&sd_config);
    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(beacon_task(sd)));
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn beacon_task(sd: &'static Softdevice) {
    let defaults = AdvertisingConfig::default();
    let config = AdvertisingConfig {
        params: AdvParams {
            interval_ms: 500,
            adv_type: AdvType::NonConnectableScannable,
            ..defaults.params
        },
        device_name: "nRF-Beacon",
        ..defaults
    };
    let mut channel: AdvChannel<_> = AdvChannel::new(SoftdeviceBroadcaster::new(sd), config);
    unwrap!(channel.init());

    loop {
        // Only the payload on air needs to stay
        channel.flush_tx();

        let uptime = Instant::now().as_secs() as u32;
        match channel.message_put(&Message::new(&uptime.to_le_bytes())) {
            Ok(()) => debug!("Broadcasting uptime {}", uptime),
            Err(e) => warn!("Payload update failed: {}", e),
        }
        if let Err(e) = channel.process_async() {
            error!("Advertising start failed: {}", e);
        }

        Timer::after(UPDATE_INTERVAL).await;
    }
}
