//! S140 SoftDevice backends
//!
//! Binds the channel traits to nrf-softdevice: NUS notifications through
//! the GATT server, advertising through the raw GAP calls.

use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, CharacteristicHandles, NotifyValueError, RegisterError, WriteOp};
use nrf_softdevice::ble::{Connection, Uuid};
use nrf_softdevice::{raw, RawError, Softdevice};

use super::adv_data::NUS_SERVICE_UUID;
use super::advertising::{AdvParams, AdvType, AdvertisingData, Broadcaster, RadioError};
use super::gatt::{GattEvent, GattLink, NusTransport, TransportError, GATT_QUEUE_LEN, NUS_MAX_DATA_LEN};

/// NUS RX characteristic, written by the central
pub const NUS_RX_CHAR_UUID: u128 = 0x6E40_0002_B5A3_F393_E0A9_E50E_24DC_CA9E;
/// NUS TX characteristic, notified to the central
pub const NUS_TX_CHAR_UUID: u128 = 0x6E40_0003_B5A3_F393_E0A9_E50E_24DC_CA9E;

/// Connection configuration tag nrf-softdevice registers its config under
const CONN_CFG_TAG: u8 = 1;

const EMPTY_VALUE: &[u8] = &[];

impl From<RawError> for RadioError {
    fn from(err: RawError) -> Self {
        match err {
            RawError::InvalidState => RadioError::InvalidState,
            RawError::InvalidParam => RadioError::InvalidParam,
            _ => RadioError::Internal,
        }
    }
}

/// Nordic UART Service registered with the SoftDevice GATT server.
///
/// Writes to RX and CCCD writes on TX are forwarded into the [`GattLink`].
pub struct NusServer<const N: usize = GATT_QUEUE_LEN> {
    link: &'static GattLink<N>,
    rx: CharacteristicHandles,
    tx: CharacteristicHandles,
}

impl<const N: usize> NusServer<N> {
    pub fn new(sd: &mut Softdevice, link: &'static GattLink<N>) -> Result<Self, RegisterError> {
        let mut sb = ServiceBuilder::new(sd, Uuid::new_128(&NUS_SERVICE_UUID.to_le_bytes()))?;

        let rx = sb
            .add_characteristic(
                Uuid::new_128(&NUS_RX_CHAR_UUID.to_le_bytes()),
                Attribute::new(EMPTY_VALUE).variable_len(NUS_MAX_DATA_LEN as u16),
                Metadata::new(Properties::new().write().write_without_response()),
            )?
            .build();

        let tx = sb
            .add_characteristic(
                Uuid::new_128(&NUS_TX_CHAR_UUID.to_le_bytes()),
                Attribute::new(EMPTY_VALUE).variable_len(NUS_MAX_DATA_LEN as u16),
                Metadata::new(Properties::new().notify()),
            )?
            .build();

        let _service = sb.build();
        debug!(
            "NUS registered - rx: {}, tx: {}, cccd: {}",
            rx.value_handle, tx.value_handle, tx.cccd_handle
        );

        Ok(Self { link, rx, tx })
    }

    /// Transport sending on this server's TX characteristic
    pub fn transport(&self) -> SoftdeviceNus {
        SoftdeviceNus::new(self.tx.value_handle)
    }
}

impl<const N: usize> gatt_server::Server for NusServer<N> {
    type Event = ();

    fn on_write(&self, _conn: &Connection, handle: u16, _op: WriteOp, _offset: usize, data: &[u8]) -> Option<()> {
        if handle == self.rx.value_handle {
            // Dropped frames are logged by the link
            let _ = self.link.handle_event(GattEvent::Received(data));
        } else if handle == self.tx.cccd_handle {
            let enabled = data.first().map_or(false, |bits| bits & 0x01 != 0);
            let _ = self.link.handle_event(GattEvent::NotificationsChanged { enabled });
        }
        None
    }
}

/// NUS notifications via `gatt_server::notify_value`
pub struct SoftdeviceNus {
    tx_handle: u16,
}

impl SoftdeviceNus {
    pub const fn new(tx_handle: u16) -> Self {
        Self { tx_handle }
    }
}

impl NusTransport for SoftdeviceNus {
    fn send(&mut self, conn_handle: u16, data: &[u8]) -> nb::Result<(), TransportError> {
        let conn = Connection::from_handle(conn_handle).ok_or(nb::Error::Other(TransportError::Disconnected))?;
        match gatt_server::notify_value(&conn, self.tx_handle, data) {
            Ok(()) => Ok(()),
            Err(NotifyValueError::Disconnected) => Err(nb::Error::Other(TransportError::Disconnected)),
            // No free notification buffer until a TX complete event
            Err(NotifyValueError::Raw(RawError::Resources)) => Err(nb::Error::WouldBlock),
            Err(NotifyValueError::Raw(err)) => {
                warn!("notify_value failed: {:?}", err);
                Err(nb::Error::Other(TransportError::Internal))
            }
        }
    }
}

/// Legacy advertising through `sd_ble_gap_adv_*`.
///
/// The SoftDevice keeps the payload pointers passed to `configure`; the
/// channel owning the payload slots must stay put (e.g. inside a task)
/// while advertising.
pub struct SoftdeviceBroadcaster {
    handle: u8,
}

impl SoftdeviceBroadcaster {
    /// Borrowing the SoftDevice proves it is enabled
    pub fn new(_sd: &Softdevice) -> Self {
        Self {
            handle: raw::BLE_GAP_ADV_SET_HANDLE_NOT_SET as u8,
        }
    }

    fn raw_params(params: &AdvParams) -> raw::ble_gap_adv_params_t {
        // SAFETY: plain C struct, all-zero is a valid value
        let mut adv_params: raw::ble_gap_adv_params_t = unsafe { core::mem::zeroed() };
        adv_params.properties.type_ = match params.adv_type {
            AdvType::NonConnectableNonScannable => raw::BLE_GAP_ADV_TYPE_NONCONNECTABLE_NONSCANNABLE_UNDIRECTED,
            AdvType::NonConnectableScannable => raw::BLE_GAP_ADV_TYPE_NONCONNECTABLE_SCANNABLE_UNDIRECTED,
            AdvType::ConnectableScannable => raw::BLE_GAP_ADV_TYPE_CONNECTABLE_SCANNABLE_UNDIRECTED,
        } as u8;
        adv_params.interval = params.interval_units();
        adv_params.duration = 0;
        adv_params.filter_policy = raw::BLE_GAP_ADV_FP_ANY as u8;
        adv_params.primary_phy = raw::BLE_GAP_PHY_1MBPS as u8;
        adv_params
    }

    fn raw_data(slice: &[u8]) -> raw::ble_data_t {
        if slice.is_empty() {
            return raw::ble_data_t {
                p_data: core::ptr::null_mut(),
                len: 0,
            };
        }
        raw::ble_data_t {
            p_data: slice.as_ptr() as *mut u8,
            len: slice.len() as u16,
        }
    }
}

impl Broadcaster for SoftdeviceBroadcaster {
    fn configure(&mut self, data: Option<AdvertisingData<'_>>, params: Option<&AdvParams>) -> Result<(), RadioError> {
        let adv_data = data.map(|data| raw::ble_gap_adv_data_t {
            adv_data: Self::raw_data(data.advertisement),
            scan_rsp_data: Self::raw_data(data.scan_response),
        });
        let adv_params = params.map(Self::raw_params);

        let data_ptr = adv_data
            .as_ref()
            .map_or(core::ptr::null(), |data| data as *const raw::ble_gap_adv_data_t);
        let params_ptr = adv_params
            .as_ref()
            .map_or(core::ptr::null(), |params| params as *const raw::ble_gap_adv_params_t);

        // SAFETY: both pointers are null or point at locals alive for the
        // call; payload pointers outlive it as documented on the type
        let ret = unsafe { raw::sd_ble_gap_adv_set_configure(&mut self.handle, data_ptr, params_ptr) };
        RawError::convert(ret).map_err(|err| {
            warn!("sd_ble_gap_adv_set_configure failed: {:?}", err);
            RadioError::from(err)
        })
    }

    fn start(&mut self) -> Result<(), RadioError> {
        let ret = unsafe { raw::sd_ble_gap_adv_start(self.handle, CONN_CFG_TAG) };
        RawError::convert(ret).map_err(RadioError::from)
    }

    fn stop(&mut self) -> Result<(), RadioError> {
        let ret = unsafe { raw::sd_ble_gap_adv_stop(self.handle) };
        match RawError::convert(ret) {
            // Already stopped, e.g. by a connection
            Ok(()) | Err(RawError::InvalidState) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError> {
        let ret = unsafe {
            raw::sd_ble_gap_tx_power_set(raw::BLE_GAP_TX_POWER_ROLE_ADV as u8, u16::from(self.handle), dbm)
        };
        RawError::convert(ret).map_err(RadioError::from)
    }
}
