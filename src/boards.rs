use embedded_can::{Id, StandardId};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::bus::LvBus;
use crate::frame::{standard_id, LvFrame};
use crate::layout::Flag;

/// Agreed address the Dashboard Controller transmits on.
pub const DASH_CONTROL_ADDR: StandardId = standard_id(0x99);
/// Agreed address the Power Controller transmits on.
pub const POWER_CONTROL_ADDR: StandardId = standard_id(0x120);
/// Agreed address the Rear Left Driver transmits on.
pub const REAR_LEFT_DRIVER_ADDR: StandardId = standard_id(0x95);

/// The gear the driver has requested through the shifter.
///
/// The discriminants are the agreed wire values; anything else on the bus
/// passes through as [`DriveMode::Other`] so a decode never loses
/// information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DriveMode {
    Park = 0,
    Forward = 1,
    Sport = 3,
    Eco = 5,
    Reverse = 8,
    Neutral = 16,
    #[num_enum(catch_all)]
    Other(u8),
}

impl Default for DriveMode {
    fn default() -> Self {
        Self::Park
    }
}

/* Dashboard Controller */

mod dash_layout {
    use crate::layout::{Flag, U8Field};

    pub const RIGHT_TURN_PWM: U8Field = U8Field::at(0);
    pub const LEFT_TURN_PWM: U8Field = U8Field::at(1);
    pub const BATTERY_FAN_PWM: U8Field = U8Field::at(3);
    pub const HEADLIGHT: Flag = Flag::at(4, 0);
    pub const HIGHBEAM: Flag = Flag::at(4, 1);
    pub const REVERSE_PRESS: Flag = Flag::at(4, 5);
    pub const DRIVE_MODE: U8Field = U8Field::at(6);
    pub const RADIATOR_FAN: Flag = Flag::at(7, 0);
    pub const RADIATOR_PUMP: Flag = Flag::at(7, 1);
}

/// State owned by the Dashboard Controller: lighting, cooling, and the
/// requested gear. Instantiate it on the dashboard board to transmit, or on
/// any other board to mirror what the dashboard is broadcasting.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DashController {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    address: Id,
    /// Brightness of the right turn signal, 0 (off) to 255 (fully on).
    pub right_turn_pwm: u8,
    /// Brightness of the left turn signal, 0 (off) to 255 (fully on).
    pub left_turn_pwm: u8,
    /// Fan duty for the battery box fan, 0 (off) to 255 (max speed).
    pub battery_fan_pwm: u8,
    pub headlight: bool,
    pub highbeam: bool,
    /// Reverse switch state; drives reverse lights and the backup camera.
    pub reverse_press: bool,
    pub drive_mode: DriveMode,
    /// Cooling fan for the motor controller radiator.
    pub radiator_fan: bool,
    /// Coolant pump for the motor controller radiator.
    pub radiator_pump: bool,
    /// Host-side flag raised when a battery-management fault has been seen.
    /// Not part of the wire format.
    pub bms_fault_detected: bool,
    /// Host-side flag raised when a motor-controller fault has been seen.
    /// Not part of the wire format.
    pub rms_fault_detected: bool,
    seen: bool,
}

impl DashController {
    pub fn new(address: impl Into<Id>) -> Self {
        Self {
            address: address.into(),
            right_turn_pwm: 0,
            left_turn_pwm: 0,
            battery_fan_pwm: 0,
            headlight: false,
            highbeam: false,
            reverse_press: false,
            drive_mode: DriveMode::Park,
            radiator_fan: false,
            radiator_pump: false,
            bms_fault_detected: false,
            rms_fault_detected: false,
            seen: false,
        }
    }

    /// Resets every field to its documented default and clears [`seen`](Self::seen).
    pub fn initialize(&mut self) {
        *self = Self::new(self.address);
    }

    /// True once a frame carrying this role's address has been decoded.
    pub fn seen(&self) -> bool {
        self.seen
    }

    /// Packs the current field values into this role's frame layout.
    pub fn encode(&self) -> LvFrame {
        let mut data = [0u8; 8];
        dash_layout::RIGHT_TURN_PWM.pack(&mut data, self.right_turn_pwm);
        dash_layout::LEFT_TURN_PWM.pack(&mut data, self.left_turn_pwm);
        dash_layout::BATTERY_FAN_PWM.pack(&mut data, self.battery_fan_pwm);
        dash_layout::HEADLIGHT.pack(&mut data, self.headlight);
        dash_layout::HIGHBEAM.pack(&mut data, self.highbeam);
        dash_layout::REVERSE_PRESS.pack(&mut data, self.reverse_press);
        dash_layout::DRIVE_MODE.pack(&mut data, self.drive_mode.into());
        dash_layout::RADIATOR_FAN.pack(&mut data, self.radiator_fan);
        dash_layout::RADIATOR_PUMP.pack(&mut data, self.radiator_pump);
        LvFrame::new(self.address, data)
    }

    pub fn send_can_data<B: LvBus>(&self, bus: &mut B) {
        bus.transmit(&self.encode());
    }

    /// Imports a received frame into the fields. Frames carrying any other
    /// address are not for this role and leave it untouched.
    pub fn receive_can_data(&mut self, frame: &LvFrame) {
        if frame.id() != self.address {
            return;
        }
        let data = frame.data();
        self.seen = true;
        self.right_turn_pwm = dash_layout::RIGHT_TURN_PWM.unpack(data);
        self.left_turn_pwm = dash_layout::LEFT_TURN_PWM.unpack(data);
        self.battery_fan_pwm = dash_layout::BATTERY_FAN_PWM.unpack(data);
        self.headlight = dash_layout::HEADLIGHT.unpack(data);
        self.highbeam = dash_layout::HIGHBEAM.unpack(data);
        self.reverse_press = dash_layout::REVERSE_PRESS.unpack(data);
        self.drive_mode = DriveMode::from(dash_layout::DRIVE_MODE.unpack(data));
        self.radiator_fan = dash_layout::RADIATOR_FAN.unpack(data);
        self.radiator_pump = dash_layout::RADIATOR_PUMP.unpack(data);
    }
}

/* Power Controller */

mod power_layout {
    use crate::layout::Flag;

    pub const BRAKE_SENSE: Flag = Flag::at(0, 0);
    pub const PUSH_TO_START: Flag = Flag::at(0, 1);
    pub const AC_CHARGE: Flag = Flag::at(0, 2);
    pub const SOLAR_CHARGE: Flag = Flag::at(0, 3);
    pub const HORN: Flag = Flag::at(0, 4);
    pub const ACC: Flag = Flag::at(1, 0);
    pub const IGN: Flag = Flag::at(1, 1);
    pub const FULL_START: Flag = Flag::at(1, 2);
    pub const CAR_ON: Flag = Flag::at(1, 3);
    pub const START_UP: Flag = Flag::at(1, 4);
    pub const LOW_POWER_MODE: Flag = Flag::at(2, 0);
    pub const LOW_ACC_BATTERY: Flag = Flag::at(2, 1);
    pub const BOARD_DETECTED: Flag = Flag::at(2, 2);
}

/// State owned by the Power Controller: pedal/button senses, busbar states
/// and the power-mode flags the rest of the network keys off.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerController {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    address: Id,
    /// Brake pedal currently pressed.
    pub brake_sense: bool,
    /// Push-to-start button currently pressed.
    pub push_to_start: bool,
    /// Charging from the wall.
    pub ac_charge: bool,
    /// Solar charge mode active.
    pub solar_charge: bool,
    pub horn: bool,
    /// Accessory busbar energized.
    pub acc: bool,
    /// Ignition busbar energized.
    pub ign: bool,
    pub full_start: bool,
    pub car_on: bool,
    pub start_up: bool,
    /// The system is operating in low power mode; other boards shed load
    /// when this is set.
    pub low_power_mode: bool,
    /// The 12 V accessory battery is low.
    pub low_acc_battery: bool,
    /// The transmitting Power Controller's own link-status flag as carried
    /// on the wire (byte 2 bit 2). Distinct from [`seen`](Self::seen),
    /// which records whether *this* instance has decoded a frame.
    pub board_detected: bool,
    seen: bool,
}

impl PowerController {
    pub fn new(address: impl Into<Id>) -> Self {
        Self {
            address: address.into(),
            brake_sense: false,
            push_to_start: false,
            ac_charge: false,
            solar_charge: false,
            horn: false,
            acc: false,
            ign: false,
            full_start: false,
            car_on: false,
            start_up: false,
            low_power_mode: false,
            low_acc_battery: false,
            board_detected: false,
            seen: false,
        }
    }

    /// Resets every field to its documented default and clears [`seen`](Self::seen).
    pub fn initialize(&mut self) {
        *self = Self::new(self.address);
    }

    /// True once a frame carrying this role's address has been decoded.
    pub fn seen(&self) -> bool {
        self.seen
    }

    /// Packs the current field values into this role's frame layout.
    pub fn encode(&self) -> LvFrame {
        let mut data = [0u8; 8];
        power_layout::BRAKE_SENSE.pack(&mut data, self.brake_sense);
        power_layout::PUSH_TO_START.pack(&mut data, self.push_to_start);
        power_layout::AC_CHARGE.pack(&mut data, self.ac_charge);
        power_layout::SOLAR_CHARGE.pack(&mut data, self.solar_charge);
        power_layout::HORN.pack(&mut data, self.horn);
        power_layout::ACC.pack(&mut data, self.acc);
        power_layout::IGN.pack(&mut data, self.ign);
        power_layout::FULL_START.pack(&mut data, self.full_start);
        power_layout::CAR_ON.pack(&mut data, self.car_on);
        power_layout::START_UP.pack(&mut data, self.start_up);
        power_layout::LOW_POWER_MODE.pack(&mut data, self.low_power_mode);
        power_layout::LOW_ACC_BATTERY.pack(&mut data, self.low_acc_battery);
        power_layout::BOARD_DETECTED.pack(&mut data, self.board_detected);
        LvFrame::new(self.address, data)
    }

    pub fn send_can_data<B: LvBus>(&self, bus: &mut B) {
        bus.transmit(&self.encode());
    }

    /// Imports a received frame into the fields. Frames carrying any other
    /// address are not for this role and leave it untouched.
    pub fn receive_can_data(&mut self, frame: &LvFrame) {
        if frame.id() != self.address {
            return;
        }
        let data = frame.data();
        self.seen = true;
        self.brake_sense = power_layout::BRAKE_SENSE.unpack(data);
        self.push_to_start = power_layout::PUSH_TO_START.unpack(data);
        self.ac_charge = power_layout::AC_CHARGE.unpack(data);
        self.solar_charge = power_layout::SOLAR_CHARGE.unpack(data);
        self.horn = power_layout::HORN.unpack(data);
        self.acc = power_layout::ACC.unpack(data);
        self.ign = power_layout::IGN.unpack(data);
        self.full_start = power_layout::FULL_START.unpack(data);
        self.car_on = power_layout::CAR_ON.unpack(data);
        self.start_up = power_layout::START_UP.unpack(data);
        self.low_power_mode = power_layout::LOW_POWER_MODE.unpack(data);
        self.low_acc_battery = power_layout::LOW_ACC_BATTERY.unpack(data);
        self.board_detected = power_layout::BOARD_DETECTED.unpack(data);
    }
}

/* High Voltage Controller */

const HV_KILLSWITCH: Flag = Flag::at(0, 0);
const HV_BMS_FAULT: Flag = Flag::at(0, 1);

/// State owned by the HV Controller: the killswitch line and the BMS fault
/// line it monitors on the high-voltage side.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HvController {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    address: Id,
    /// Manual killswitch has been thrown.
    pub killswitch: bool,
    /// The battery management system is reporting a fault.
    pub bms_fault: bool,
    seen: bool,
}

impl HvController {
    pub fn new(address: impl Into<Id>) -> Self {
        Self {
            address: address.into(),
            killswitch: false,
            bms_fault: false,
            seen: false,
        }
    }

    pub fn initialize(&mut self) {
        *self = Self::new(self.address);
    }

    /// True once a frame carrying this role's address has been decoded.
    pub fn seen(&self) -> bool {
        self.seen
    }

    pub fn encode(&self) -> LvFrame {
        let mut data = [0u8; 8];
        HV_KILLSWITCH.pack(&mut data, self.killswitch);
        HV_BMS_FAULT.pack(&mut data, self.bms_fault);
        LvFrame::new(self.address, data)
    }

    pub fn send_can_data<B: LvBus>(&self, bus: &mut B) {
        bus.transmit(&self.encode());
    }

    pub fn receive_can_data(&mut self, frame: &LvFrame) {
        if frame.id() != self.address {
            return;
        }
        let data = frame.data();
        self.seen = true;
        self.killswitch = HV_KILLSWITCH.unpack(data);
        self.bms_fault = HV_BMS_FAULT.unpack(data);
    }
}

/* Rear Left Driver */

// Byte 0 carries the BMS fault line, byte 1 the manual kill-switch fault
// line. Earlier firmware decoded both bytes into the BMS field; byte 0 is
// authoritative for it.
const RL_BMS_FAULT_INPUT: Flag = Flag::at(0, 0);
const RL_SWITCH_FAULT_INPUT: Flag = Flag::at(1, 0);

/// State owned by the rear-left low-power driver board, which reads the BMS
/// and kill-switch fault lines for the rest of the system.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RearLeftDriver {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    address: Id,
    pub bms_fault_input: bool,
    pub switch_fault_input: bool,
    seen: bool,
}

impl RearLeftDriver {
    pub fn new(address: impl Into<Id>) -> Self {
        Self {
            address: address.into(),
            bms_fault_input: false,
            switch_fault_input: false,
            seen: false,
        }
    }

    pub fn initialize(&mut self) {
        *self = Self::new(self.address);
    }

    /// True once a frame carrying this role's address has been decoded.
    pub fn seen(&self) -> bool {
        self.seen
    }

    pub fn encode(&self) -> LvFrame {
        let mut data = [0u8; 8];
        RL_BMS_FAULT_INPUT.pack(&mut data, self.bms_fault_input);
        RL_SWITCH_FAULT_INPUT.pack(&mut data, self.switch_fault_input);
        LvFrame::new(self.address, data)
    }

    pub fn send_can_data<B: LvBus>(&self, bus: &mut B) {
        bus.transmit(&self.encode());
    }

    pub fn receive_can_data(&mut self, frame: &LvFrame) {
        if frame.id() != self.address {
            return;
        }
        let data = frame.data();
        self.seen = true;
        self.bms_fault_input = RL_BMS_FAULT_INPUT.unpack(data);
        self.switch_fault_input = RL_SWITCH_FAULT_INPUT.unpack(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::RecordingBus;

    #[test]
    fn dash_initialize_encodes_all_zero() {
        let mut dash = DashController::new(DASH_CONTROL_ADDR);
        dash.right_turn_pwm = 40;
        dash.headlight = true;
        dash.initialize();
        assert_eq!(dash.encode().data(), &[0; 8]);
        assert!(!dash.seen());
    }

    #[test]
    fn dash_round_trip() {
        let mut dash = DashController::new(DASH_CONTROL_ADDR);
        dash.right_turn_pwm = 255;
        dash.headlight = true;
        dash.highbeam = true;
        dash.drive_mode = DriveMode::Forward;
        dash.radiator_fan = true;
        dash.radiator_pump = true;

        let frame = dash.encode();
        assert_eq!(frame.data(), &[255, 0, 0, 0, 0x03, 0, 1, 0x03]);

        let mut mirror = DashController::new(DASH_CONTROL_ADDR);
        mirror.receive_can_data(&frame);
        assert!(mirror.seen());
        assert_eq!(mirror.right_turn_pwm, 255);
        assert!(mirror.headlight);
        assert!(mirror.highbeam);
        assert_eq!(mirror.drive_mode, DriveMode::Forward);
        assert!(mirror.radiator_fan);
        assert!(mirror.radiator_pump);
        assert!(!mirror.reverse_press);
    }

    #[test]
    fn mismatched_address_is_ignored() {
        let mut dash = DashController::new(DASH_CONTROL_ADDR);
        dash.receive_can_data(&LvFrame::new(POWER_CONTROL_ADDR, [0xFF; 8]));
        assert!(!dash.seen());
        assert_eq!(dash.right_turn_pwm, 0);
        assert!(!dash.headlight);
    }

    #[test]
    fn unknown_drive_mode_survives_a_round_trip() {
        let mut dash = DashController::new(DASH_CONTROL_ADDR);
        dash.drive_mode = DriveMode::Other(42);
        let mut mirror = DashController::new(DASH_CONTROL_ADDR);
        mirror.receive_can_data(&dash.encode());
        assert_eq!(mirror.drive_mode, DriveMode::Other(42));
    }

    #[test]
    fn power_controller_round_trip() {
        let mut power = PowerController::new(POWER_CONTROL_ADDR);
        power.brake_sense = true;
        power.horn = true;
        power.acc = true;
        power.start_up = true;
        power.low_acc_battery = true;
        power.board_detected = true;

        let frame = power.encode();
        assert_eq!(frame.data(), &[0b1_0001, 0b1_0001, 0b110, 0, 0, 0, 0, 0]);

        let mut mirror = PowerController::new(POWER_CONTROL_ADDR);
        mirror.receive_can_data(&frame);
        assert!(mirror.seen());
        assert!(mirror.brake_sense);
        assert!(mirror.horn);
        assert!(mirror.acc);
        assert!(mirror.start_up);
        assert!(mirror.low_acc_battery);
        assert!(mirror.board_detected);
        assert!(!mirror.push_to_start);
        assert!(!mirror.car_on);
    }

    #[test]
    fn power_controller_seen_is_not_cleared_by_the_wire_bit() {
        let mut mirror = PowerController::new(POWER_CONTROL_ADDR);
        // A frame from a freshly booted peer has the link-status bit clear.
        mirror.receive_can_data(&LvFrame::new(POWER_CONTROL_ADDR, [0; 8]));
        assert!(mirror.seen());
        assert!(!mirror.board_detected);
    }

    #[test]
    fn hv_controller_round_trip() {
        let mut hv = HvController::new(StandardId::new(0x96).unwrap());
        hv.killswitch = true;
        hv.bms_fault = true;
        assert_eq!(hv.encode().data(), &[0x03, 0, 0, 0, 0, 0, 0, 0]);

        let mut mirror = HvController::new(StandardId::new(0x96).unwrap());
        mirror.receive_can_data(&hv.encode());
        assert!(mirror.seen());
        assert!(mirror.killswitch);
        assert!(mirror.bms_fault);
    }

    #[test]
    fn rear_left_fault_lines_decode_from_their_own_bytes() {
        let mut driver = RearLeftDriver::new(REAR_LEFT_DRIVER_ADDR);
        driver.receive_can_data(&LvFrame::new(REAR_LEFT_DRIVER_ADDR, [0, 1, 0, 0, 0, 0, 0, 0]));
        assert!(driver.seen());
        assert!(!driver.bms_fault_input);
        assert!(driver.switch_fault_input);

        driver.receive_can_data(&LvFrame::new(REAR_LEFT_DRIVER_ADDR, [1, 0, 0, 0, 0, 0, 0, 0]));
        assert!(driver.bms_fault_input);
        assert!(!driver.switch_fault_input);
    }

    #[test]
    fn send_transmits_one_frame_on_the_role_address() {
        let mut bus = RecordingBus::new();
        let dash = DashController::new(DASH_CONTROL_ADDR);
        dash.send_can_data(&mut bus);
        assert_eq!(bus.sent.len(), 1);
        assert_eq!(bus.sent[0].id(), Id::Standard(DASH_CONTROL_ADDR));
    }

    #[test]
    fn host_loop_polls_the_bus_and_feeds_decoders() {
        let mut bus = RecordingBus::new();
        let mut sender = DashController::new(DASH_CONTROL_ADDR);
        sender.headlight = true;
        bus.queue(sender.encode());

        let mut mirror = DashController::new(DASH_CONTROL_ADDR);
        while let Some(frame) = bus.receive() {
            mirror.receive_can_data(&frame);
        }

        assert!(mirror.seen());
        assert!(mirror.headlight);
    }
}
