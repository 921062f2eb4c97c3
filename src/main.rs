#![no_std]
#![no_main]

//! NUS bridge firmware
//!
//! Connectable advertising plus a Nordic UART Service. Everything a central
//! writes to RX goes through the GATT channel and is echoed back on TX.

use defmt::*;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_nrf::{config::Config, interrupt};
use embassy_time::{Duration, Timer};
use nrf_comm_channels::ble::gatt::{GattChannel, GattEvent, GattLink, NUS_MAX_DATA_LEN};
use nrf_comm_channels::ble::softdevice::{NusServer, SoftdeviceNus};
use nrf_comm_channels::{Channel, Error, Message};
use nrf_softdevice::ble::advertisement_builder::{Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload};
use nrf_softdevice::ble::{gatt_server, peripheral};
use nrf_softdevice::{raw, Config as SdConfig, Softdevice};
use panic_probe as _;

static NUS_LINK: GattLink = GattLink::new();

/// How often the channel is polled
const PROCESS_INTERVAL: Duration = Duration::from_millis(20);

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting NUS bridge");

    // Configure interrupt priorities to avoid SoftDevice reserved levels (0, 1, 4)
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
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        // 247 byte ATT MTU gives the 244 byte NUS payload
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 247 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: 1408,
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
    let server = unwrap!(NusServer::new(sd, &NUS_LINK));
    let transport = server.transport();
    info!("SoftDevice enabled, NUS registered");

    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(ble_task(sd, server)));
    unwrap!(spawner.spawn(channel_task(transport)));
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn ble_task(sd: &'static Softdevice, server: NusServer) {
    static ADV_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
        .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
        .full_name("NUS-Bridge")
        .build();

    static SCAN_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new().build();

    loop {
        let config = peripheral::Config::default();
        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &ADV_DATA,
            scan_data: &SCAN_DATA,
        };

        let conn = match peripheral::advertise_connectable(sd, adv, &config).await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Advertising failed: {:?}", Debug2Format(&e));
                Timer::after(Duration::from_secs(1)).await;
                continue;
            }
        };

        if let Some(conn_handle) = conn.handle() {
            let _ = NUS_LINK.handle_event(GattEvent::Connected { conn_handle });
        }

        // Returns when the connection is gone
        let e = gatt_server::run(&conn, &server, |_| {}).await;
        debug!("gatt_server exited: {:?}", Debug2Format(&e));
        let _ = NUS_LINK.handle_event(GattEvent::Disconnected);
    }
}

#[embassy_executor::task]
async fn channel_task(transport: SoftdeviceNus) {
    let mut channel = GattChannel::new(&NUS_LINK, transport);
    unwrap!(channel.init());

    let mut frame = [0u8; NUS_MAX_DATA_LEN];
    loop {
        // Echo everything received
        loop {
            match channel.message_get(&mut frame) {
                Ok(len) => {
                    if let Err(e) = channel.message_put(&Message::new(&frame[..len])) {
                        warn!("Echo dropped: {}", e);
                    }
                }
                Err(Error::NotFound) => break,
                Err(e) => {
                    warn!("Receive failed: {}", e);
                    break;
                }
            }
        }

        match channel.process_async() {
            Ok(()) => {}
            Err(e) if e.is_fatal() => defmt::panic!("NUS channel fault: {}", e),
            Err(e) => debug!("NUS process: {}", e),
        }

        Timer::after(PROCESS_INTERVAL).await;
    }
}
