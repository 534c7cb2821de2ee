use embedded_can::{Id, StandardId};
use heapless::FnvIndexMap;

use crate::bus::LvBus;
use crate::frame::{standard_id, LvFrame};

/// Agreed address for the forwarded HV pack statistics.
pub const ORION_PACK_STATS_ADDR: StandardId = standard_id(0x112);
/// Agreed address for the forwarded cell statistics and DTC error codes.
pub const ORION_CELL_DTC_ADDR: StandardId = standard_id(0x113);
/// Agreed address for the forwarded current limits and temperatures.
pub const ORION_CURRENT_LIMIT_TEMP_ADDR: StandardId = standard_id(0x114);
/// Agreed address for the forwarded J1772 charger status.
pub const ORION_J1772_ADDR: StandardId = standard_id(0x115);
/// Agreed address for the forwarded motor-controller power statistics.
pub const RMS_POWER_STATS_ADDR: StandardId = standard_id(0x116);
/// Agreed address for the forwarded motor RPM, torque and temperatures.
pub const RMS_MOTOR_TEMP_ADDR: StandardId = standard_id(0x117);
/// Agreed address for the forwarded motor-controller fault words.
pub const RMS_FAULTS_ADDR: StandardId = standard_id(0x118);

/// Message identifiers used on the richer upstream HV buses.
///
/// The Orion BMS broadcasts big-endian custom messages; the RMS PM100
/// inverter broadcasts little-endian vendor messages. Only the identifiers
/// the relays actually forward are listed; both buses carry many more.
pub mod upstream {
    /* Orion BMS broadcast IDs */
    pub const BMS_PACK_STATS: u32 = 0x6B0;
    pub const BMS_CURRENT_LIMITS: u32 = 0x6B1;
    pub const BMS_PACK_ENERGY: u32 = 0x6B2;
    pub const BMS_CELL_AND_CHARGER: u32 = 0x6B3;
    pub const BMS_CELL_RESISTANCE: u32 = 0x6B4;
    pub const BMS_SUPPLY_AND_AC: u32 = 0x6B5;
    pub const BMS_CELL_SUMMARY_DTC: u32 = 0x6B6;
    /// Per-cell telemetry broadcast. Deliberately not registered: it
    /// rewrites the same fields once per cell ID and carries nothing the LV
    /// network consumes.
    pub const BMS_CELL_BROADCAST: u32 = 0x36;

    /* RMS PM100 broadcast IDs */
    pub const RMS_TEMPERATURE_SET_2: u32 = 0xA1;
    pub const RMS_TEMPERATURE_SET_3: u32 = 0xA2;
    pub const RMS_MOTOR_POSITION: u32 = 0xA5;
    pub const RMS_CURRENT_INFO: u32 = 0xA6;
    pub const RMS_VOLTAGE_INFO: u32 = 0xA7;
    pub const RMS_INTERNAL_VOLTAGES: u32 = 0xA9;
    pub const RMS_FAULT_CODES: u32 = 0xAB;
    pub const RMS_TORQUE_TIMER: u32 = 0xAC;
}

/// A decode routine for one upstream message type. Receives the raw
/// identifier alongside the payload so one routine can serve several IDs.
pub type UpstreamHandler<T> = fn(&mut T, id: u32, data: &[u8; 8]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("Tried to register an upstream decoder but the dispatch table is full")]
pub struct UpstreamTableFull;

fn be_u16(data: &[u8; 8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn le_u16(data: &[u8; 8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn le_i16(data: &[u8; 8], at: usize) -> i16 {
    i16::from_le_bytes([data[at], data[at + 1]])
}

/* Orion BMS relay */

mod pack_stats {
    use crate::layout::{Scaled16, Scaled8, U8Field};

    pub const PACK_CURRENT: Scaled16 = Scaled16::at(0, 10.0); // 0.1 A
    pub const PACK_VOLTAGE: Scaled16 = Scaled16::at(2, 10.0); // 0.1 V
    pub const PACK_AMP_HOURS: Scaled8 = Scaled8::at(4, 10.0); // 0.1 Ah
    pub const PACK_RESISTANCE: Scaled8 = Scaled8::at(5, 1000.0); // 1 mOhm
    pub const PACK_SOC: U8Field = U8Field::at(6); // percent
    pub const SUPPLY_VOLTAGE: Scaled8 = Scaled8::at(7, 10.0); // 0.1 V
}

mod cell_stats {
    use crate::layout::{Scaled8, U16Field};

    pub const AVG_CELL_VOLTAGE: Scaled8 = Scaled8::at(0, 10.0); // 0.1 V
    pub const HIGH_CELL_VOLTAGE: Scaled8 = Scaled8::at(1, 10.0); // 0.1 V
    pub const LOW_CELL_VOLTAGE: Scaled8 = Scaled8::at(2, 10.0); // 0.1 V
    pub const LOW_CELL_RESISTANCE: Scaled8 = Scaled8::at(3, 10.0); // 0.1 mOhm
    pub const DTC_FLAGS_1: U16Field = U16Field::at(4);
    pub const DTC_FLAGS_2: U16Field = U16Field::at(6);
}

mod limits_temps {
    use crate::layout::{U16Field, U8Field};

    pub const DISCHARGE_LIMIT: U16Field = U16Field::at(0); // 1 A
    pub const CHARGE_LIMIT: U16Field = U16Field::at(2); // 1 A
    pub const BMS_AVERAGE_TEMP: U8Field = U8Field::at(4); // degrees C
    pub const BMS_INTERNAL_TEMP: U8Field = U8Field::at(5); // degrees C
    pub const THERMISTOR_HIGH_TEMP: U8Field = U8Field::at(6); // degrees C
    pub const THERMISTOR_LOW_TEMP: U8Field = U8Field::at(7); // degrees C
}

mod j1772 {
    use crate::layout::{Flag, U8Field};

    pub const PLUG_CONNECTED: Flag = Flag::at(0, 0);
    pub const AC_CURRENT_LIMIT: U8Field = U8Field::at(1); // 1 A
    pub const AC_VOLTAGE: U8Field = U8Field::at(2); // 1 V
}

const ORION_UPSTREAM_DEFAULTS: &[(u32, UpstreamHandler<OrionBms>)] = &[
    (upstream::BMS_PACK_STATS, OrionBms::upstream_pack_stats),
    (upstream::BMS_CURRENT_LIMITS, OrionBms::upstream_current_limits),
    (upstream::BMS_PACK_ENERGY, OrionBms::upstream_pack_energy),
    (
        upstream::BMS_CELL_AND_CHARGER,
        OrionBms::upstream_cell_and_charger,
    ),
    (
        upstream::BMS_CELL_RESISTANCE,
        OrionBms::upstream_cell_resistance,
    ),
    (upstream::BMS_SUPPLY_AND_AC, OrionBms::upstream_supply_and_ac),
    (
        upstream::BMS_CELL_SUMMARY_DTC,
        OrionBms::upstream_cell_summary_dtc,
    ),
];

/// Relay for the Orion battery management system.
///
/// On the board wired to the HV bus, [`ingest_upstream`](Self::ingest_upstream)
/// parses the BMS broadcasts and [`send_can_data`](Self::send_can_data)
/// re-publishes the condensed values as four LV sub-frames. Every other
/// board mirrors those sub-frames with [`receive_can_data`](Self::receive_can_data).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OrionBms {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    pack_stats_addr: Id,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    cell_dtc_addr: Id,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    current_limit_temp_addr: Id,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    j1772_addr: Id,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    upstream: FnvIndexMap<u32, UpstreamHandler<Self>, 16>,

    /// Amps currently charged into / discharged from the pack.
    pub pack_current_amps: f32,
    /// Raw voltage reading of the full pack.
    pub pack_voltage: f32,
    /// 12 V supply voltage the BMS itself is fed with.
    pub supply_voltage: f32,
    pub avg_cell_voltage: f32,
    pub highest_cell_voltage: f32,
    pub lowest_cell_voltage: f32,
    /// Estimated amp-hours remaining in the pack.
    pub pack_amp_hours: f32,
    /// Pack resistance estimated by the BMS, in ohms.
    pub pack_resistance_ohms: f32,
    /// Resistance of the weakest cell, 0.1 mOhm wire resolution.
    pub lowest_cell_resistance: f32,
    /// State of charge, 0-100 %.
    pub pack_soc: u8,
    /// Maximum discharge current allowed by the BMS, amps.
    pub discharge_current_limit: u16,
    /// Maximum charge current allowed by the BMS, amps.
    pub charge_current_limit: u16,
    pub bms_average_temp_c: u8,
    pub bms_internal_temp_c: u8,
    pub thermistor_high_temp_c: u8,
    pub thermistor_low_temp_c: u8,
    /// A J1772 charge plug is connected.
    pub j1772_plug_connected: bool,
    /// AC current limit advertised by the charge plug, amps.
    pub j1772_ac_current_limit: u8,
    /// AC voltage measured at the charge plug, volts.
    pub j1772_ac_voltage: u8,
    /// Diagnostic trouble code bit masks, group 1. See the Orion manual for
    /// the bit assignments.
    pub dtc_flags_1: u16,
    /// Diagnostic trouble code bit masks, group 2.
    pub dtc_flags_2: u16,

    pack_stats_received: bool,
    cell_dtc_received: bool,
    current_limit_temp_received: bool,
    j1772_received: bool,
}

impl OrionBms {
    pub fn new(
        pack_stats_addr: impl Into<Id>,
        cell_dtc_addr: impl Into<Id>,
        current_limit_temp_addr: impl Into<Id>,
        j1772_addr: impl Into<Id>,
    ) -> Self {
        let mut upstream = FnvIndexMap::new();
        for (id, handler) in ORION_UPSTREAM_DEFAULTS {
            let _ = upstream.insert(*id, *handler);
        }

        Self {
            pack_stats_addr: pack_stats_addr.into(),
            cell_dtc_addr: cell_dtc_addr.into(),
            current_limit_temp_addr: current_limit_temp_addr.into(),
            j1772_addr: j1772_addr.into(),
            upstream,
            pack_current_amps: 0.0,
            pack_voltage: 0.0,
            supply_voltage: 0.0,
            avg_cell_voltage: 0.0,
            highest_cell_voltage: 0.0,
            lowest_cell_voltage: 0.0,
            pack_amp_hours: 0.0,
            pack_resistance_ohms: 0.0,
            lowest_cell_resistance: 0.0,
            pack_soc: 0,
            discharge_current_limit: 0,
            charge_current_limit: 0,
            bms_average_temp_c: 0,
            bms_internal_temp_c: 0,
            thermistor_high_temp_c: 0,
            thermistor_low_temp_c: 0,
            j1772_plug_connected: false,
            j1772_ac_current_limit: 0,
            j1772_ac_voltage: 0,
            dtc_flags_1: 0,
            dtc_flags_2: 0,
            pack_stats_received: false,
            cell_dtc_received: false,
            current_limit_temp_received: false,
            j1772_received: false,
        }
    }

    /// Resets every field to its default; the upstream dispatch table keeps
    /// its registrations.
    pub fn initialize(&mut self) {
        let upstream = self.upstream.clone();
        *self = Self::new(
            self.pack_stats_addr,
            self.cell_dtc_addr,
            self.current_limit_temp_addr,
            self.j1772_addr,
        );
        self.upstream = upstream;
    }

    pub fn pack_stats_received(&self) -> bool {
        self.pack_stats_received
    }

    pub fn cell_dtc_received(&self) -> bool {
        self.cell_dtc_received
    }

    pub fn current_limit_temp_received(&self) -> bool {
        self.current_limit_temp_received
    }

    pub fn j1772_received(&self) -> bool {
        self.j1772_received
    }

    fn encode_pack_stats(&self) -> LvFrame {
        let mut data = [0u8; 8];
        pack_stats::PACK_CURRENT.pack(&mut data, self.pack_current_amps);
        pack_stats::PACK_VOLTAGE.pack(&mut data, self.pack_voltage);
        pack_stats::PACK_AMP_HOURS.pack(&mut data, self.pack_amp_hours);
        pack_stats::PACK_RESISTANCE.pack(&mut data, self.pack_resistance_ohms);
        pack_stats::PACK_SOC.pack(&mut data, self.pack_soc);
        pack_stats::SUPPLY_VOLTAGE.pack(&mut data, self.supply_voltage);
        LvFrame::new(self.pack_stats_addr, data)
    }

    fn encode_cell_dtc(&self) -> LvFrame {
        let mut data = [0u8; 8];
        cell_stats::AVG_CELL_VOLTAGE.pack(&mut data, self.avg_cell_voltage);
        cell_stats::HIGH_CELL_VOLTAGE.pack(&mut data, self.highest_cell_voltage);
        cell_stats::LOW_CELL_VOLTAGE.pack(&mut data, self.lowest_cell_voltage);
        cell_stats::LOW_CELL_RESISTANCE.pack(&mut data, self.lowest_cell_resistance);
        cell_stats::DTC_FLAGS_1.pack(&mut data, self.dtc_flags_1);
        cell_stats::DTC_FLAGS_2.pack(&mut data, self.dtc_flags_2);
        LvFrame::new(self.cell_dtc_addr, data)
    }

    fn encode_current_limit_temp(&self) -> LvFrame {
        let mut data = [0u8; 8];
        limits_temps::DISCHARGE_LIMIT.pack(&mut data, self.discharge_current_limit);
        limits_temps::CHARGE_LIMIT.pack(&mut data, self.charge_current_limit);
        limits_temps::BMS_AVERAGE_TEMP.pack(&mut data, self.bms_average_temp_c);
        limits_temps::BMS_INTERNAL_TEMP.pack(&mut data, self.bms_internal_temp_c);
        limits_temps::THERMISTOR_HIGH_TEMP.pack(&mut data, self.thermistor_high_temp_c);
        limits_temps::THERMISTOR_LOW_TEMP.pack(&mut data, self.thermistor_low_temp_c);
        LvFrame::new(self.current_limit_temp_addr, data)
    }

    fn encode_j1772(&self) -> LvFrame {
        let mut data = [0u8; 8];
        j1772::PLUG_CONNECTED.pack(&mut data, self.j1772_plug_connected);
        j1772::AC_CURRENT_LIMIT.pack(&mut data, self.j1772_ac_current_limit);
        j1772::AC_VOLTAGE.pack(&mut data, self.j1772_ac_voltage);
        LvFrame::new(self.j1772_addr, data)
    }

    /// Transmits all four sub-frames in their fixed order. Nothing is
    /// skipped, even when no field changed since the last call.
    pub fn send_can_data<B: LvBus>(&self, bus: &mut B) {
        bus.transmit(&self.encode_pack_stats());
        bus.transmit(&self.encode_cell_dtc());
        bus.transmit(&self.encode_current_limit_temp());
        bus.transmit(&self.encode_j1772());
    }

    /// Imports an LV frame published by the board doing the HV translation.
    /// Only the sub-frame whose address matches is decoded.
    pub fn receive_can_data(&mut self, frame: &LvFrame) {
        let data = frame.data();
        if frame.id() == self.pack_stats_addr {
            self.pack_current_amps = pack_stats::PACK_CURRENT.unpack(data);
            self.pack_voltage = pack_stats::PACK_VOLTAGE.unpack(data);
            self.pack_amp_hours = pack_stats::PACK_AMP_HOURS.unpack(data);
            self.pack_resistance_ohms = pack_stats::PACK_RESISTANCE.unpack(data);
            self.pack_soc = pack_stats::PACK_SOC.unpack(data);
            self.supply_voltage = pack_stats::SUPPLY_VOLTAGE.unpack(data);
            self.pack_stats_received = true;
        } else if frame.id() == self.cell_dtc_addr {
            self.avg_cell_voltage = cell_stats::AVG_CELL_VOLTAGE.unpack(data);
            self.highest_cell_voltage = cell_stats::HIGH_CELL_VOLTAGE.unpack(data);
            self.lowest_cell_voltage = cell_stats::LOW_CELL_VOLTAGE.unpack(data);
            self.lowest_cell_resistance = cell_stats::LOW_CELL_RESISTANCE.unpack(data);
            self.dtc_flags_1 = cell_stats::DTC_FLAGS_1.unpack(data);
            self.dtc_flags_2 = cell_stats::DTC_FLAGS_2.unpack(data);
            self.cell_dtc_received = true;
        } else if frame.id() == self.current_limit_temp_addr {
            self.discharge_current_limit = limits_temps::DISCHARGE_LIMIT.unpack(data);
            self.charge_current_limit = limits_temps::CHARGE_LIMIT.unpack(data);
            self.bms_average_temp_c = limits_temps::BMS_AVERAGE_TEMP.unpack(data);
            self.bms_internal_temp_c = limits_temps::BMS_INTERNAL_TEMP.unpack(data);
            self.thermistor_high_temp_c = limits_temps::THERMISTOR_HIGH_TEMP.unpack(data);
            self.thermistor_low_temp_c = limits_temps::THERMISTOR_LOW_TEMP.unpack(data);
            self.current_limit_temp_received = true;
        } else if frame.id() == self.j1772_addr {
            self.j1772_plug_connected = j1772::PLUG_CONNECTED.unpack(data);
            self.j1772_ac_current_limit = j1772::AC_CURRENT_LIMIT.unpack(data);
            self.j1772_ac_voltage = j1772::AC_VOLTAGE.unpack(data);
            self.j1772_received = true;
        }
    }

    /// Feeds one message from the HV battery bus through the dispatch
    /// table. Identifiers without a registered decoder fall through to the
    /// legacy path and leave the fields stale.
    pub fn ingest_upstream(&mut self, frame: &LvFrame) {
        let id = frame.raw_id();
        if let Some(handler) = self.upstream.get(&id).copied() {
            handler(self, id, frame.data());
        } else {
            self.legacy_upstream(id, frame.data());
        }
    }

    /// Registers (or replaces) an upstream decoder for the given message
    /// identifier.
    pub fn register_upstream(
        &mut self,
        id: u32,
        handler: UpstreamHandler<Self>,
    ) -> Result<(), UpstreamTableFull> {
        self.upstream
            .insert(id, handler)
            .map(|_| ())
            .map_err(|_| UpstreamTableFull)
    }

    /// Catch-all for upstream traffic nothing is registered for. The HV bus
    /// carries many more message types than the relay forwards; they are
    /// dropped here.
    fn legacy_upstream(&mut self, _id: u32, _data: &[u8; 8]) {}

    fn upstream_pack_stats(&mut self, _id: u32, data: &[u8; 8]) {
        self.pack_current_amps = be_u16(data, 0) as f32 / 10.0;
        self.pack_voltage = be_u16(data, 2) as f32 / 10.0;
        // The BMS broadcasts SOC in 0.5 % steps; the LV network uses 1 %.
        self.pack_soc = data[4] / 2;
    }

    fn upstream_current_limits(&mut self, _id: u32, data: &[u8; 8]) {
        self.discharge_current_limit = be_u16(data, 0);
        self.charge_current_limit = be_u16(data, 2);
        self.thermistor_high_temp_c = data[4];
        self.thermistor_low_temp_c = data[5];
    }

    fn upstream_pack_energy(&mut self, _id: u32, data: &[u8; 8]) {
        self.pack_amp_hours = data[0] as f32 / 10.0;
        self.pack_resistance_ohms = data[1] as f32 / 1000.0;
    }

    fn upstream_cell_and_charger(&mut self, _id: u32, data: &[u8; 8]) {
        self.lowest_cell_voltage = data[0] as f32 / 10.0;
        self.bms_average_temp_c = data[1];
        self.bms_internal_temp_c = data[2];
        self.j1772_plug_connected = data[3] & 1 != 0;
        self.j1772_ac_current_limit = data[4];
    }

    fn upstream_cell_resistance(&mut self, _id: u32, data: &[u8; 8]) {
        self.lowest_cell_resistance = data[0] as f32 / 10.0;
    }

    fn upstream_supply_and_ac(&mut self, _id: u32, data: &[u8; 8]) {
        self.supply_voltage = data[0] as f32 / 10.0;
        self.j1772_ac_voltage = data[1];
    }

    fn upstream_cell_summary_dtc(&mut self, _id: u32, data: &[u8; 8]) {
        self.avg_cell_voltage = data[0] as f32 / 10.0;
        self.highest_cell_voltage = data[1] as f32 / 10.0;
        self.dtc_flags_1 = be_u16(data, 2);
        self.dtc_flags_2 = be_u16(data, 4);
    }
}

/* RMS motor controller relay */

mod power_stats {
    use crate::layout::Scaled16;

    pub const ACCESSORY_VOLTAGE: Scaled16 = Scaled16::at(0, 100.0); // 0.01 V
    pub const BUS_VOLTAGE: Scaled16 = Scaled16::at(2, 10.0); // 0.1 V
    pub const BUS_CURRENT: Scaled16 = Scaled16::at(4, 10.0); // 0.1 A
    pub const PHASE_A_CURRENT: Scaled16 = Scaled16::at(6, 10.0); // 0.1 A
}

mod motor_temp {
    use crate::layout::{Scaled16, U16Field};

    pub const MOTOR_RPM: U16Field = U16Field::at(0); // 1 RPM
    pub const MOTOR_TEMPERATURE: Scaled16 = Scaled16::at(2, 10.0); // 0.1 C
    pub const INVERTER_TEMPERATURE: Scaled16 = Scaled16::at(4, 10.0); // 0.1 C
    pub const COMMANDED_TORQUE: Scaled16 = Scaled16::at(6, 10.0); // 0.1 Nm
}

mod fault_words {
    use crate::layout::U16Field;

    pub const POST_FAULT_HIGH: U16Field = U16Field::at(0);
    pub const POST_FAULT_LOW: U16Field = U16Field::at(2);
    pub const RUN_FAULT_HIGH: U16Field = U16Field::at(4);
    pub const RUN_FAULT_LOW: U16Field = U16Field::at(6);
}

const RMS_UPSTREAM_DEFAULTS: &[(u32, UpstreamHandler<RmsController>)] = &[
    (
        upstream::RMS_TEMPERATURE_SET_2,
        RmsController::upstream_temperature_set_2,
    ),
    (
        upstream::RMS_TEMPERATURE_SET_3,
        RmsController::upstream_temperature_set_3,
    ),
    (
        upstream::RMS_MOTOR_POSITION,
        RmsController::upstream_motor_position,
    ),
    (
        upstream::RMS_CURRENT_INFO,
        RmsController::upstream_current_info,
    ),
    (
        upstream::RMS_VOLTAGE_INFO,
        RmsController::upstream_voltage_info,
    ),
    (
        upstream::RMS_INTERNAL_VOLTAGES,
        RmsController::upstream_internal_voltages,
    ),
    (
        upstream::RMS_FAULT_CODES,
        RmsController::upstream_fault_codes,
    ),
    (
        upstream::RMS_TORQUE_TIMER,
        RmsController::upstream_torque_timer,
    ),
];

/// Relay for the RMS PM100 motor controller, forwarding three LV sub-frames:
/// power statistics, motor/temperature data and the fault words.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RmsController {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    power_stats_addr: Id,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    motor_temp_addr: Id,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    faults_addr: Id,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    upstream: FnvIndexMap<u32, UpstreamHandler<Self>, 16>,

    /// Upper word of the power-on self test fault code. See the PM100
    /// documentation for the code assignments.
    pub post_fault_high: u16,
    /// Lower word of the power-on self test fault code.
    pub post_fault_low: u16,
    /// Upper word of the run fault code.
    pub run_fault_high: u16,
    /// Lower word of the run fault code.
    pub run_fault_low: u16,
    /// 12 V accessory bus voltage as read by the inverter.
    pub accessory_voltage: f32,
    /// High-voltage DC bus voltage.
    pub bus_voltage: f32,
    /// High-voltage DC bus current.
    pub bus_current: f32,
    /// Pedal-commanded torque, Nm.
    pub commanded_torque: f32,
    pub phase_a_current: f32,
    pub motor_temperature_c: f32,
    pub inverter_temperature_c: f32,
    /// Motor shaft speed. Reads 0 when the pedal is released.
    pub motor_rpm: u16,
    /// Any fault word is non-zero.
    pub fault_active: bool,

    power_stats_received: bool,
    motor_temp_received: bool,
    faults_received: bool,
}

impl RmsController {
    pub fn new(
        power_stats_addr: impl Into<Id>,
        motor_temp_addr: impl Into<Id>,
        faults_addr: impl Into<Id>,
    ) -> Self {
        let mut upstream = FnvIndexMap::new();
        for (id, handler) in RMS_UPSTREAM_DEFAULTS {
            let _ = upstream.insert(*id, *handler);
        }

        Self {
            power_stats_addr: power_stats_addr.into(),
            motor_temp_addr: motor_temp_addr.into(),
            faults_addr: faults_addr.into(),
            upstream,
            post_fault_high: 0,
            post_fault_low: 0,
            run_fault_high: 0,
            run_fault_low: 0,
            accessory_voltage: 0.0,
            bus_voltage: 0.0,
            bus_current: 0.0,
            commanded_torque: 0.0,
            phase_a_current: 0.0,
            motor_temperature_c: 0.0,
            inverter_temperature_c: 0.0,
            motor_rpm: 0,
            fault_active: false,
            power_stats_received: false,
            motor_temp_received: false,
            faults_received: false,
        }
    }

    /// Resets every field to its default; the upstream dispatch table keeps
    /// its registrations.
    pub fn initialize(&mut self) {
        let upstream = self.upstream.clone();
        *self = Self::new(self.power_stats_addr, self.motor_temp_addr, self.faults_addr);
        self.upstream = upstream;
    }

    pub fn power_stats_received(&self) -> bool {
        self.power_stats_received
    }

    pub fn motor_temp_received(&self) -> bool {
        self.motor_temp_received
    }

    pub fn faults_received(&self) -> bool {
        self.faults_received
    }

    fn encode_power_stats(&self) -> LvFrame {
        let mut data = [0u8; 8];
        power_stats::ACCESSORY_VOLTAGE.pack(&mut data, self.accessory_voltage);
        power_stats::BUS_VOLTAGE.pack(&mut data, self.bus_voltage);
        power_stats::BUS_CURRENT.pack(&mut data, self.bus_current);
        power_stats::PHASE_A_CURRENT.pack(&mut data, self.phase_a_current);
        LvFrame::new(self.power_stats_addr, data)
    }

    fn encode_motor_temp(&self) -> LvFrame {
        let mut data = [0u8; 8];
        motor_temp::MOTOR_RPM.pack(&mut data, self.motor_rpm);
        motor_temp::MOTOR_TEMPERATURE.pack(&mut data, self.motor_temperature_c);
        motor_temp::INVERTER_TEMPERATURE.pack(&mut data, self.inverter_temperature_c);
        motor_temp::COMMANDED_TORQUE.pack(&mut data, self.commanded_torque);
        LvFrame::new(self.motor_temp_addr, data)
    }

    fn encode_faults(&self) -> LvFrame {
        let mut data = [0u8; 8];
        fault_words::POST_FAULT_HIGH.pack(&mut data, self.post_fault_high);
        fault_words::POST_FAULT_LOW.pack(&mut data, self.post_fault_low);
        fault_words::RUN_FAULT_HIGH.pack(&mut data, self.run_fault_high);
        fault_words::RUN_FAULT_LOW.pack(&mut data, self.run_fault_low);
        LvFrame::new(self.faults_addr, data)
    }

    /// Transmits all three sub-frames in their fixed order. Nothing is
    /// skipped, even when no field changed since the last call.
    pub fn send_can_data<B: LvBus>(&self, bus: &mut B) {
        bus.transmit(&self.encode_power_stats());
        bus.transmit(&self.encode_motor_temp());
        bus.transmit(&self.encode_faults());
    }

    /// Imports an LV frame published by the board doing the HV translation.
    /// Only the sub-frame whose address matches is decoded.
    pub fn receive_can_data(&mut self, frame: &LvFrame) {
        let data = frame.data();
        if frame.id() == self.power_stats_addr {
            self.accessory_voltage = power_stats::ACCESSORY_VOLTAGE.unpack(data);
            self.bus_voltage = power_stats::BUS_VOLTAGE.unpack(data);
            self.bus_current = power_stats::BUS_CURRENT.unpack(data);
            self.phase_a_current = power_stats::PHASE_A_CURRENT.unpack(data);
            self.power_stats_received = true;
        } else if frame.id() == self.motor_temp_addr {
            self.motor_rpm = motor_temp::MOTOR_RPM.unpack(data);
            self.motor_temperature_c = motor_temp::MOTOR_TEMPERATURE.unpack(data);
            self.inverter_temperature_c = motor_temp::INVERTER_TEMPERATURE.unpack(data);
            self.commanded_torque = motor_temp::COMMANDED_TORQUE.unpack(data);
            self.motor_temp_received = true;
        } else if frame.id() == self.faults_addr {
            self.post_fault_high = fault_words::POST_FAULT_HIGH.unpack(data);
            self.post_fault_low = fault_words::POST_FAULT_LOW.unpack(data);
            self.run_fault_high = fault_words::RUN_FAULT_HIGH.unpack(data);
            self.run_fault_low = fault_words::RUN_FAULT_LOW.unpack(data);
            self.faults_received = true;
        }
    }

    /// Feeds one message from the inverter's CAN bus through the dispatch
    /// table. Identifiers without a registered decoder fall through to the
    /// legacy path and leave the fields stale.
    pub fn ingest_upstream(&mut self, frame: &LvFrame) {
        let id = frame.raw_id();
        if let Some(handler) = self.upstream.get(&id).copied() {
            handler(self, id, frame.data());
        } else {
            self.legacy_upstream(id, frame.data());
        }
    }

    /// Registers (or replaces) an upstream decoder for the given message
    /// identifier.
    pub fn register_upstream(
        &mut self,
        id: u32,
        handler: UpstreamHandler<Self>,
    ) -> Result<(), UpstreamTableFull> {
        self.upstream
            .insert(id, handler)
            .map(|_| ())
            .map_err(|_| UpstreamTableFull)
    }

    /// Catch-all for upstream traffic nothing is registered for.
    fn legacy_upstream(&mut self, _id: u32, _data: &[u8; 8]) {}

    // The PM100 broadcasts little-endian signed words.

    fn upstream_temperature_set_2(&mut self, _id: u32, data: &[u8; 8]) {
        self.inverter_temperature_c = le_i16(data, 0) as f32 / 10.0;
    }

    fn upstream_temperature_set_3(&mut self, _id: u32, data: &[u8; 8]) {
        self.motor_temperature_c = le_i16(data, 4) as f32 / 10.0;
    }

    fn upstream_motor_position(&mut self, _id: u32, data: &[u8; 8]) {
        self.motor_rpm = le_i16(data, 2) as u16;
    }

    fn upstream_current_info(&mut self, _id: u32, data: &[u8; 8]) {
        self.phase_a_current = le_i16(data, 0) as f32 / 10.0;
        self.bus_current = le_i16(data, 6) as f32 / 10.0;
    }

    fn upstream_voltage_info(&mut self, _id: u32, data: &[u8; 8]) {
        self.bus_voltage = le_i16(data, 0) as f32 / 10.0;
    }

    fn upstream_internal_voltages(&mut self, _id: u32, data: &[u8; 8]) {
        self.accessory_voltage = le_i16(data, 6) as f32 / 100.0;
    }

    fn upstream_fault_codes(&mut self, _id: u32, data: &[u8; 8]) {
        self.post_fault_low = le_u16(data, 0);
        self.post_fault_high = le_u16(data, 2);
        self.run_fault_low = le_u16(data, 4);
        self.run_fault_high = le_u16(data, 6);
        self.fault_active =
            self.run_fault_low > 0 || self.post_fault_low > 0 || self.post_fault_high > 0;
    }

    fn upstream_torque_timer(&mut self, _id: u32, data: &[u8; 8]) {
        self.commanded_torque = le_i16(data, 0) as f32 / 10.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::RecordingBus;

    fn orion() -> OrionBms {
        OrionBms::new(
            ORION_PACK_STATS_ADDR,
            ORION_CELL_DTC_ADDR,
            ORION_CURRENT_LIMIT_TEMP_ADDR,
            ORION_J1772_ADDR,
        )
    }

    fn rms() -> RmsController {
        RmsController::new(RMS_POWER_STATS_ADDR, RMS_MOTOR_TEMP_ADDR, RMS_FAULTS_ADDR)
    }

    #[test]
    fn pack_current_encodes_in_tenth_amp_counts() {
        let mut bms = orion();
        bms.pack_current_amps = 12.3;
        let frame = bms.encode_pack_stats();
        assert_eq!(&frame.data()[0..2], &[0, 123]);
    }

    #[test]
    fn pack_stats_round_trip() {
        let frame = LvFrame::new(ORION_PACK_STATS_ADDR, [0, 123, 0x0F, 0x2E, 25, 30, 87, 132]);
        let mut bms = orion();
        bms.receive_can_data(&frame);
        assert!(bms.pack_stats_received());
        assert!((bms.pack_current_amps - 12.3).abs() < 0.1);
        assert!((bms.pack_voltage - 388.6).abs() < 0.1);
        assert!((bms.pack_amp_hours - 2.5).abs() < 0.1);
        assert!((bms.pack_resistance_ohms - 0.030).abs() < 0.001);
        assert_eq!(bms.pack_soc, 87);
        assert!((bms.supply_voltage - 13.2).abs() < 0.1);

        // Re-encoding stays within one wire count of the original bytes.
        let echoed = bms.encode_pack_stats();
        for (a, b) in echoed.data().iter().zip(frame.data()) {
            assert!(a.abs_diff(*b) <= 1);
        }
    }

    #[test]
    fn orion_sends_all_four_sub_frames_in_order() {
        let mut bus = RecordingBus::new();
        orion().send_can_data(&mut bus);

        let ids: heapless::Vec<u32, 4> = bus.sent.iter().map(|f| f.raw_id()).collect();
        assert_eq!(&ids[..], &[0x112, 0x113, 0x114, 0x115]);
    }

    #[test]
    fn rms_sends_all_three_sub_frames_in_order() {
        let mut bus = RecordingBus::new();
        rms().send_can_data(&mut bus);

        let ids: heapless::Vec<u32, 3> = bus.sent.iter().map(|f| f.raw_id()).collect();
        assert_eq!(&ids[..], &[0x116, 0x117, 0x118]);
    }

    #[test]
    fn mismatched_address_leaves_the_relay_untouched() {
        let mut bms = orion();
        bms.receive_can_data(&LvFrame::new(RMS_POWER_STATS_ADDR, [0xFF; 8]));
        assert!(!bms.pack_stats_received());
        assert!(!bms.cell_dtc_received());
        assert_eq!(bms.pack_soc, 0);
    }

    #[test]
    fn upstream_pack_stats_decode_big_endian() {
        let mut bms = orion();
        // 123 counts of 0.1 A, 3886 counts of 0.1 V, SOC 87 % in 0.5 % steps.
        bms.ingest_upstream(
            &LvFrame::from_raw(upstream::BMS_PACK_STATS, [0, 123, 0x0F, 0x2E, 174, 0, 0, 0])
                .unwrap(),
        );
        assert!((bms.pack_current_amps - 12.3).abs() < 0.1);
        assert!((bms.pack_voltage - 388.6).abs() < 0.1);
        assert_eq!(bms.pack_soc, 87);
    }

    #[test]
    fn upstream_voltage_info_decodes_little_endian() {
        let mut rms = rms();
        // 3886 = 0x0F2E counts of 0.1 V, little endian on the wire.
        rms.ingest_upstream(
            &LvFrame::from_raw(upstream::RMS_VOLTAGE_INFO, [0x2E, 0x0F, 0, 0, 0, 0, 0, 0])
                .unwrap(),
        );
        assert!((rms.bus_voltage - 388.6).abs() < 0.1);
    }

    #[test]
    fn upstream_fault_codes_raise_fault_active() {
        let mut rms = rms();
        rms.ingest_upstream(
            &LvFrame::from_raw(upstream::RMS_FAULT_CODES, [0, 0, 0, 0, 0x02, 0, 0, 0]).unwrap(),
        );
        assert_eq!(rms.run_fault_low, 2);
        assert!(rms.fault_active);

        rms.ingest_upstream(
            &LvFrame::from_raw(upstream::RMS_FAULT_CODES, [0; 8]).unwrap(),
        );
        assert!(!rms.fault_active);
    }

    #[test]
    fn unregistered_upstream_ids_are_ignored() {
        let mut rms = rms();
        rms.ingest_upstream(&LvFrame::from_raw(0xA0, [0xFF; 8]).unwrap());
        assert_eq!(rms.motor_rpm, 0);
        assert!((rms.bus_voltage - 0.0).abs() < f32::EPSILON);
        assert!(!rms.fault_active);
    }

    #[test]
    fn custom_upstream_handlers_can_be_registered() {
        fn fast_info(rms: &mut RmsController, _id: u32, data: &[u8; 8]) {
            rms.motor_rpm = le_u16(data, 0);
        }

        let mut rms = rms();
        rms.register_upstream(0xB0, fast_info).unwrap();
        rms.ingest_upstream(&LvFrame::from_raw(0xB0, [0xD0, 0x07, 0, 0, 0, 0, 0, 0]).unwrap());
        assert_eq!(rms.motor_rpm, 2000);
    }

    #[test]
    fn negative_motor_temperature_decodes_signed() {
        let mut rms = rms();
        // -5.0 C is -50 counts, little endian two's complement.
        rms.ingest_upstream(
            &LvFrame::from_raw(
                upstream::RMS_TEMPERATURE_SET_3,
                [0, 0, 0, 0, 0xCE, 0xFF, 0, 0],
            )
            .unwrap(),
        );
        assert!((rms.motor_temperature_c + 5.0).abs() < 0.1);
    }

    #[test]
    fn initialize_keeps_upstream_registrations() {
        fn noop(_rms: &mut RmsController, _id: u32, _data: &[u8; 8]) {}

        let mut rms = rms();
        rms.register_upstream(0xB0, noop).unwrap();
        rms.motor_rpm = 900;
        rms.initialize();
        assert_eq!(rms.motor_rpm, 0);
        assert!(rms.upstream.contains_key(&0xB0));
    }
}
