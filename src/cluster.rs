use embedded_can::StandardId;
use num_enum::IntoPrimitive;

use crate::boards::DriveMode;
use crate::bus::LvBus;
use crate::frame::{standard_id, LvFrame};

/* Spoofed instrument cluster addresses */

/// Fakes the speedometer.
pub const SPEED_CAN_ADDR: StandardId = standard_id(0xB4);
/// Fakes the anti-lock brake system.
pub const ABS_CAN_ADDR: StandardId = standard_id(0x3B7);
/// Fakes the SRS airbag system.
pub const AIRBAG_CAN_ADDR: StandardId = standard_id(0x3B1);
/// Fakes the engine controller.
pub const ENGINE_CONTROL_CAN_ADDR: StandardId = standard_id(0x3BB);
/// Fakes the power steering system.
pub const POWER_STEER_CAN_ADDR: StandardId = standard_id(0x394);
/// Fakes the parking brake.
pub const PARKING_BRAKE_CAN_ADDR: StandardId = standard_id(0x32C);
/// Fakes the park assist system.
pub const PARK_ASSIST_CAN_ADDR: StandardId = standard_id(0x378);
/// Fakes the lane departure system.
pub const LANE_DEPART_CAN_ADDR: StandardId = standard_id(0x412);
/// Fakes the pre-collision system.
pub const PRECOLLISION_CAN_ADDR: StandardId = standard_id(0x411);
/// Fakes the parking sonar.
pub const PARKING_CAN_ADDR: StandardId = standard_id(0x43A);
/// Fakes the smart key system.
pub const SMART_KEY_CAN_ADDR: StandardId = standard_id(0x633);
/// Fakes the motor controller driving the RPM dial.
pub const MOTOR_SPOOF_CAN_ADDR: StandardId = standard_id(0x1EA);
/// Fakes the transmission controller.
pub const TRANSMISSION_CAN_ADDR: StandardId = standard_id(0x3BC);
/// Fakes the startup animations and backlight dimming.
pub const ANIMATIONS_CAN_ADDR: StandardId = standard_id(0x620);
/// Fakes the fuel economy meter.
pub const FUEL_ECONOMY_CAN_ADDR: StandardId = standard_id(0x1C4);
/// Fakes the lighting controller.
pub const LIGHTING_CAN_ADDR: StandardId = standard_id(0x622);
/// Fakes the engine prompt messages on the LCD.
pub const ENGINE_PROMPTS_CAN_ADDR: StandardId = standard_id(0x400);
/// Fakes the outdoor temperature sensor.
pub const OUTDOOR_TEMP_CAN_ADDR: StandardId = standard_id(0x3B0);

const FAST_PERIOD_MS: u32 = 25;
const MEDIUM_PERIOD_MS: u32 = 250;
const SLOW_PERIOD_MS: u32 = 1000;

/// Power sequence prompt shown on the cluster LCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PowerPrompt {
    /// Clears all power prompts.
    #[default]
    PowerGood = 0x00,
    /// "Turn Power Off Before Exiting Vehicle"
    TurnPowerOff = 0x01,
    /// "Shift to Park Before Exiting Vehicle"
    ShiftToPark = 0x02,
    /// "Hybrid System Stopped"
    HybridSystemStopped = 0x04,
    /// "Shift to Neutral and Push Engine Switch to Restart"
    ShiftToNeutralRestart = 0x08,
    /// "Press Brake Pedal and Push Power Switch to Start"
    PressBrakeToStart = 0x30,
    /// "Key Not Detected In Vehicle"
    KeyNotDetected = 0x40,
    /// Ignition state: "Not ready to drive" with the brake-and-start icon.
    IgnitionPrompt = 0x50,
}

/// Backlight level of the cluster LCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Brightness {
    Low = 0xF0,
    #[default]
    High = 0xB0,
}

/// Engine stopped prompt shown on the cluster LCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EngineStoppedCode {
    #[default]
    Normal = 0x00,
    /// "Engine Stopped, stop in a safe place"
    Stopped = 0x10,
    /// Same prompt, plus a beep.
    StoppedBeep = 0x1B,
}

/// Check engine prompt shown on the cluster LCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CheckEnginePrompt {
    #[default]
    None = 0x00,
    /// "Check Engine"
    CheckEngine = 0x10,
    /// "Reduced Engine Power"
    ReducedPower = 0x30,
    /// "Engine Maintenance Required"
    MaintenanceRequired = 0x40,
}

/// Parking brake prompt shown on the cluster LCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ParkingBrakePrompt {
    #[default]
    Good = 0x00,
    /// "Parking Brake May Roll"
    MayRoll = 0x10,
    /// "Parking Brake Automatically Applied"
    AutoApply = 0x20,
    /// "Parking Brake On"
    BrakeOn = 0x30,
    /// "Parking Brake Unable to Disengage"
    NoDisengage = 0x40,
    /// "Shift Interlock Activated"
    ShiftInterlockOn = 0x50,
    /// "Shift Interlock Deactivated"
    ShiftInterlockOff = 0x60,
    /// "Parking Brake Unable to Disengage"
    UnableToDisengage = 0x70,
    /// "Parking Brake Unavailable, May Roll"
    UnavailableMayRoll = 0x80,
    /// "Parking Brake Unavailable"
    Unavailable = 0x90,
    /// "Parking Brake Temporarily Unavailable"
    TemporarilyUnavailable = 0xA0,
    /// "Parking Brake Malfunction"
    Malfunction = 0xB0,
    /// "Parking Brake Unavailable"
    ParkUnavailable = 0xC0,
    /// "Parking Brake Malfunction"
    ParkMalfunction = 0xD0,
}

/// "Take a Break" prompt shown on the cluster LCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TakeBreakPrompt {
    #[default]
    None = 0x00,
    /// "Would you like to take a Break"
    AskBreak = 0x40,
    /// "Please take a Break"
    TakeBreak = 0x80,
}

/// Beeper cadence of the cluster, from continuous through slowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BeepRate {
    #[default]
    Off = 0x00,
    Continuous = 0x01,
    /// Fastest intermittent rate.
    Rate1 = 0x02,
    Rate2 = 0x03,
    Rate3 = 0x04,
    Rate4 = 0x05,
    Rate5 = 0x06,
    Rate6 = 0x07,
    /// Slowest intermittent rate.
    Rate7 = 0x08,
}

/// Color of a lane departure indicator on the HUD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HudLaneColor {
    #[default]
    Off = 0x00,
    /// Clear outline only.
    Clear = 0x01,
    /// Filled white.
    White = 0x02,
    /// Flashing orange.
    Orange = 0x03,
}

/// Drives a third-party Camry instrument cluster by spoofing the frames its
/// original ECUs would send.
///
/// The cluster expects traffic at three cadences; [`send_can_data`](Self::send_can_data)
/// runs all three tiers (fast, medium, slow, in that order) against an
/// injected millisecond clock. A tier whose period has not elapsed is
/// skipped whole. Independently of the periodic tiers, a handful of watched
/// fields (lighting, seatbelt, brake icon, engine faults and prompts) are
/// compared against their last-sent values on every call and fire their
/// frame immediately on change, so switch flips reach the cluster without
/// waiting out a period.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CamryCluster {
    /// Red BRAKE text.
    pub brake_icon: bool,
    /// Yellow circled exclamation mark.
    pub parking_brake_circle: bool,
    /// Red seat belt icon.
    pub seat_belt_icon: bool,
    /// Check engine indicator.
    pub check_engine_on: bool,
    /// Cluster backlight on/off.
    pub cluster_backlight: bool,
    /// Low oil pressure prompt.
    pub oil_pressure_low: bool,
    /// Low accessory battery prompt. Takes precedence over the oil
    /// pressure prompt when both are set.
    pub charging_system_malfunction: bool,
    /// Motor temperature in degrees C; moves the temperature dial.
    pub motor_temp_deg_c: u16,
    /// Steering wheel warning icon.
    pub power_steering_icon: bool,
    /// Raw power steering prompt code for the LCD.
    pub power_steering_prompt: u8,
    pub lcd_power_prompt: PowerPrompt,
    pub lcd_brightness: Brightness,
    /// Shows the trunk open on the LCD car outline.
    pub trunk_open: bool,
    pub front_left_door: bool,
    pub front_right_door: bool,
    pub rear_left_door: bool,
    pub rear_right_door: bool,
    /// Plays the fancy LCD animation on power-up.
    pub animate_startup: bool,
    pub engine_stopped_code: EngineStoppedCode,
    pub check_engine_prompt: CheckEnginePrompt,
    pub parking_brake_prompt: ParkingBrakePrompt,
    /// Motor RPM shown on the dial.
    pub rpm_gauge: u16,
    /// Vehicle speed shown on the dial.
    pub speed_gauge: u16,
    /// Percentage of bars on the economy display, 0-100.
    pub eco_gauge: u8,
    /// ECO leaf on the bottom right of the LCD.
    pub eco_leaf: bool,
    pub fog_light_orange: bool,
    pub fog_light_green: bool,
    /// Headlight indicator.
    pub headlight: bool,
    /// High beam indicator.
    pub highbeam: bool,
    pub drive_mode: DriveMode,
    /// Sport gear (1-10) shown next to the drive mode, 0 for none.
    pub gear_number: u8,
    /// Red banner and SPORT text.
    pub sport_mode: bool,
    /// Blue banner and ECO Mode text.
    pub eco_mode: bool,
    /// The car may move; allows gear shifting on the display.
    pub ready_to_drive: bool,
    /// Crash brake prompt on the LCD.
    pub crash_brake_prompt: bool,
    pub cluster_beeps: BeepRate,
    /// Blue left lane departure on the HUD; may be shown alongside the
    /// colored one.
    pub hud_blue_left_lane: bool,
    pub hud_blue_right_lane: bool,
    pub hud_left_lane_color: HudLaneColor,
    pub hud_right_lane_color: HudLaneColor,
    pub lcd_take_break_prompt: TakeBreakPrompt,
    /// Outside temperature in degrees F, shown on the LCD.
    pub outside_temperature_f: i32,

    // Last-sent values for the watched fields. Seeded with the complement
    // of the live value so the first call after initialize always fires.
    last_headlight: bool,
    last_highbeam: bool,
    last_seat_belt_icon: bool,
    last_brake_icon: bool,
    last_engine_fault: u8,
    last_low_acc: u8,
    last_motor_temp: u16,
    last_engine_stopped_code: u8,
    last_check_engine_prompt: u8,

    speed_pulse: u16,
    pulse_phase: bool,
    last_fast_ms: u32,
    last_medium_ms: u32,
    last_slow_ms: u32,
}

impl Default for CamryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl CamryCluster {
    pub fn new() -> Self {
        let mut cluster = Self {
            brake_icon: false,
            parking_brake_circle: false,
            seat_belt_icon: false,
            check_engine_on: false,
            cluster_backlight: true,
            oil_pressure_low: false,
            charging_system_malfunction: false,
            motor_temp_deg_c: 25,
            power_steering_icon: false,
            power_steering_prompt: 0x00,
            lcd_power_prompt: PowerPrompt::PowerGood,
            lcd_brightness: Brightness::High,
            trunk_open: false,
            front_left_door: false,
            front_right_door: false,
            rear_left_door: false,
            rear_right_door: false,
            animate_startup: false,
            engine_stopped_code: EngineStoppedCode::Normal,
            check_engine_prompt: CheckEnginePrompt::None,
            parking_brake_prompt: ParkingBrakePrompt::Good,
            rpm_gauge: 0,
            speed_gauge: 0,
            eco_gauge: 0x3C,
            eco_leaf: false,
            fog_light_orange: false,
            fog_light_green: false,
            headlight: false,
            highbeam: false,
            drive_mode: DriveMode::Park,
            gear_number: 0,
            sport_mode: false,
            eco_mode: false,
            ready_to_drive: false,
            crash_brake_prompt: false,
            cluster_beeps: BeepRate::Off,
            hud_blue_left_lane: false,
            hud_blue_right_lane: false,
            hud_left_lane_color: HudLaneColor::Off,
            hud_right_lane_color: HudLaneColor::Off,
            lcd_take_break_prompt: TakeBreakPrompt::None,
            outside_temperature_f: 0,
            last_headlight: false,
            last_highbeam: false,
            last_seat_belt_icon: false,
            last_brake_icon: false,
            last_engine_fault: 0,
            last_low_acc: 0,
            last_motor_temp: 0,
            last_engine_stopped_code: 0,
            last_check_engine_prompt: 0,
            speed_pulse: 0,
            pulse_phase: false,
            last_fast_ms: 0,
            last_medium_ms: 0,
            last_slow_ms: 0,
        };
        cluster.reset_shadows();
        cluster
    }

    /// Resets every field to its documented default and re-arms the
    /// change detection so the next call resends every watched frame.
    pub fn initialize(&mut self) {
        *self = Self::new();
    }

    fn reset_shadows(&mut self) {
        self.last_headlight = !self.headlight;
        self.last_highbeam = !self.highbeam;
        self.last_seat_belt_icon = !self.seat_belt_icon;
        self.last_brake_icon = !self.brake_icon;
        self.last_engine_fault = !self.engine_fault_byte();
        self.last_low_acc = !self.low_acc_byte();
        self.last_motor_temp = !self.motor_temp_deg_c;
        self.last_engine_stopped_code = !u8::from(self.engine_stopped_code);
        self.last_check_engine_prompt = !u8::from(self.check_engine_prompt);
    }

    /// Generates the spoof traffic due at `now_ms` on the injected
    /// millisecond clock. Call this from the host loop as often as
    /// possible; the tier timers decide what actually goes out.
    pub fn send_can_data<B: LvBus>(&mut self, bus: &mut B, now_ms: u32) {
        self.send_fast_frames(bus, now_ms);
        self.send_medium_frames(bus, now_ms);
        self.send_slow_frames(bus, now_ms);
    }

    /* Fast tier (25 ms) */

    fn send_fast_frames<B: LvBus>(&mut self, bus: &mut B, now_ms: u32) {
        if now_ms.wrapping_sub(self.last_fast_ms) < FAST_PERIOD_MS {
            return;
        }
        self.last_fast_ms = now_ms;

        // The speedometer wants a free-running pulse counter alongside the
        // dial position; it advances on alternate fast batches, ~0.56
        // counts per unit of speed.
        if self.pulse_phase {
            self.speed_pulse = self
                .speed_pulse
                .wrapping_add((self.speed_gauge as f32 * 0.56) as u16);
        }
        self.pulse_phase = !self.pulse_phase;

        bus.transmit(&self.parking_brake_frame());
        bus.transmit(&self.speed_frame());
        if self.drive_mode != DriveMode::Park {
            bus.transmit(&self.fuel_economy_frame());
        }
    }

    fn parking_brake_frame(&self) -> LvFrame {
        let circle = if self.parking_brake_circle { 0x02 } else { 0x00 };
        LvFrame::new(
            PARKING_BRAKE_CAN_ADDR,
            [
                0x88,
                circle,
                self.parking_brake_prompt.into(),
                0,
                0,
                0,
                0,
                0xC7,
            ],
        )
    }

    fn speed_frame(&self) -> LvFrame {
        let speed_mask = self.speed_gauge.wrapping_mul(160);
        LvFrame::new(
            SPEED_CAN_ADDR,
            [
                0,
                0,
                0,
                0,
                (self.speed_pulse & 255) as u8,
                (speed_mask >> 8) as u8,
                (speed_mask & 255) as u8,
                0xBC,
            ],
        )
    }

    fn fuel_economy_frame(&self) -> LvFrame {
        LvFrame::new(
            FUEL_ECONOMY_CAN_ADDR,
            [0, 0, 0, 0, 0, 1, self.economy_bitmask(), 0],
        )
    }

    /// Bar mask for the economy display; the eco leaf lives in the upper
    /// two bits.
    fn economy_bitmask(&self) -> u8 {
        let bars = ((self.eco_gauge as u16 * 0x3C) / 100) as u8 & 0x3C;
        if self.eco_leaf {
            bars + 0xC0
        } else {
            bars
        }
    }

    /* Medium tier (250 ms) */

    fn send_medium_frames<B: LvBus>(&mut self, bus: &mut B, now_ms: u32) {
        // The BRAKE icon updates instantly when toggled.
        if self.brake_icon != self.last_brake_icon {
            bus.transmit(&self.abs_frame(false));
            self.last_brake_icon = self.brake_icon;
        }

        if now_ms.wrapping_sub(self.last_medium_ms) < MEDIUM_PERIOD_MS {
            return;
        }
        self.last_medium_ms = now_ms;

        bus.transmit(&self.abs_frame(true));
        bus.transmit(&self.power_steering_frame());
        bus.transmit(&self.park_assist_frame());
        bus.transmit(&self.motor_rpm_frame());
        bus.transmit(&self.transmission_frame());

        self.last_brake_icon = self.brake_icon;
    }

    /// All zeroes clears the anti-lock brake errors; 0x40 in byte 0 turns
    /// on the BRAKE text. The periodic variant carries 0x08 in byte 7.
    fn abs_frame(&self, periodic: bool) -> LvFrame {
        let brake = if self.brake_icon { 0x40 } else { 0x00 };
        let tail = if periodic { 0x08 } else { 0x00 };
        LvFrame::new(ABS_CAN_ADDR, [brake, 0, 0, 0, 0, 0, 0, tail])
    }

    fn power_steering_frame(&self) -> LvFrame {
        let icon = if self.power_steering_icon { 0x38 } else { 0x00 };
        LvFrame::new(
            POWER_STEER_CAN_ADDR,
            [0, icon, self.power_steering_prompt, 0, 0, 0, 0, 0],
        )
    }

    fn park_assist_frame(&self) -> LvFrame {
        LvFrame::new(PARK_ASSIST_CAN_ADDR, [0; 8])
    }

    fn motor_rpm_frame(&self) -> LvFrame {
        LvFrame::new(
            MOTOR_SPOOF_CAN_ADDR,
            [
                0,
                0,
                0,
                0,
                0,
                0,
                (self.rpm_gauge / 200) as u8,
                (self.rpm_gauge % 200) as u8,
            ],
        )
    }

    fn transmission_frame(&self) -> LvFrame {
        let other_gear = match self.drive_mode {
            DriveMode::Park => {
                if self.ready_to_drive {
                    0x20
                } else {
                    0x00
                }
            }
            DriveMode::Reverse => 0x10,
            DriveMode::Sport => 0x09,
            DriveMode::Neutral => 0x08,
            _ => 0x00,
        };

        let drive_set = if !matches!(self.drive_mode, DriveMode::Park | DriveMode::Reverse) {
            0x80
        } else {
            0x00
        };

        // Eco wins over sport when both banners are requested.
        let drive_modifier = if self.eco_mode {
            0x30
        } else if self.sport_mode {
            0x10
        } else {
            0x00
        };

        LvFrame::new(
            TRANSMISSION_CAN_ADDR,
            [
                0,
                other_gear,
                0,
                0,
                self.gear_number << 4,
                drive_set,
                0,
                drive_modifier,
            ],
        )
    }

    /* Slow tier (1000 ms) */

    fn send_slow_frames<B: LvBus>(&mut self, bus: &mut B, now_ms: u32) {
        let engine_fault = self.engine_fault_byte();
        let low_acc = self.low_acc_byte();

        // Light switches, the seatbelt icon and the engine prompts update
        // instantly when toggled.
        if self.headlight != self.last_headlight || self.highbeam != self.last_highbeam {
            bus.transmit(&self.lighting_frame());
            self.last_headlight = self.headlight;
            self.last_highbeam = self.highbeam;
        }

        if self.seat_belt_icon != self.last_seat_belt_icon {
            bus.transmit(&self.airbag_frame(false));
            self.last_seat_belt_icon = self.seat_belt_icon;
        }

        if engine_fault != self.last_engine_fault
            || low_acc != self.last_low_acc
            || self.motor_temp_deg_c != self.last_motor_temp
        {
            bus.transmit(&self.engine_control_frame());
            self.last_engine_fault = engine_fault;
            self.last_low_acc = low_acc;
            self.last_motor_temp = self.motor_temp_deg_c;
        }

        if u8::from(self.engine_stopped_code) != self.last_engine_stopped_code
            || u8::from(self.check_engine_prompt) != self.last_check_engine_prompt
        {
            bus.transmit(&self.engine_prompts_frame());
            self.last_engine_stopped_code = self.engine_stopped_code.into();
            self.last_check_engine_prompt = self.check_engine_prompt.into();
        }

        if now_ms.wrapping_sub(self.last_slow_ms) < SLOW_PERIOD_MS {
            return;
        }
        self.last_slow_ms = now_ms;

        bus.transmit(&self.airbag_frame(true));
        bus.transmit(&self.lane_departure_frame());
        bus.transmit(&self.precollision_frame());
        bus.transmit(&self.parking_sonar_frame());
        bus.transmit(&self.lighting_frame());
        bus.transmit(&self.engine_control_frame());
        bus.transmit(&self.smart_key_frame());
        bus.transmit(&self.animations_frame());
        bus.transmit(&self.engine_prompts_frame());
        bus.transmit(&self.outdoor_temp_frame());

        self.last_headlight = self.headlight;
        self.last_highbeam = self.highbeam;
        self.last_engine_fault = engine_fault;
        self.last_low_acc = low_acc;
        self.last_motor_temp = self.motor_temp_deg_c;
        self.last_engine_stopped_code = self.engine_stopped_code.into();
        self.last_check_engine_prompt = self.check_engine_prompt.into();
    }

    /// The periodic airbag variant carries 0x08/0xC5 in bytes 5/7; the
    /// edge-triggered one zeroes them.
    fn airbag_frame(&self, periodic: bool) -> LvFrame {
        let belt = if self.seat_belt_icon { 0x05 } else { 0x00 };
        let data = if periodic {
            [0, 0, 0, belt, 0, 0x08, 0, 0xC5]
        } else {
            [0, 0, 0, belt, 0, 0, 0, 0]
        };
        LvFrame::new(AIRBAG_CAN_ADDR, data)
    }

    fn lighting_frame(&self) -> LvFrame {
        let lights = ((self.headlight as u8) << 5) | ((self.highbeam as u8) << 6);
        LvFrame::new(LIGHTING_CAN_ADDR, [0x12, 0, 0xE8, lights, 0, 0, 0, 0])
    }

    fn lane_departure_frame(&self) -> LvFrame {
        LvFrame::new(
            LANE_DEPART_CAN_ADDR,
            [
                self.hud_lane_mask(),
                0,
                0,
                0,
                0,
                0,
                self.lcd_take_break_prompt.into(),
                10,
            ],
        )
    }

    /// The HUD lane indicators only care whether a lane color is set at
    /// all; the color selection itself is not part of this frame.
    fn hud_lane_mask(&self) -> u8 {
        self.hud_blue_left_lane as u8
            | (self.hud_blue_right_lane as u8) << 1
            | ((self.hud_left_lane_color != HudLaneColor::Off) as u8) << 2
            | ((self.hud_right_lane_color != HudLaneColor::Off) as u8) << 4
    }

    fn precollision_frame(&self) -> LvFrame {
        let crash = if self.crash_brake_prompt { 0x10 } else { 0x00 };
        LvFrame::new(
            PRECOLLISION_CAN_ADDR,
            [crash, 0, 0, self.cluster_beeps.into(), 0, 0, 0, 0],
        )
    }

    fn parking_sonar_frame(&self) -> LvFrame {
        LvFrame::new(PARKING_CAN_ADDR, [1, 1, 1, 1, 0, 0, 0, 0])
    }

    fn engine_control_frame(&self) -> LvFrame {
        let dial = (self.motor_temp_deg_c as f32 * 1.59 + 65.0) as u8;
        LvFrame::new(
            ENGINE_CONTROL_CAN_ADDR,
            [self.engine_fault_byte(), self.low_acc_byte(), dial, 0, 0, 0, 0, 0],
        )
    }

    /// Check engine and backlight share one status byte.
    fn engine_fault_byte(&self) -> u8 {
        match (self.cluster_backlight, self.check_engine_on) {
            (true, true) => 0x00,
            (true, false) => 0x40,
            (false, true) => 0xB0,
            (false, false) => 0xC0,
        }
    }

    /// Battery trumps oil pressure when both prompts are requested.
    fn low_acc_byte(&self) -> u8 {
        if self.charging_system_malfunction {
            0x04
        } else if self.oil_pressure_low {
            0x03
        } else {
            0x00
        }
    }

    fn smart_key_frame(&self) -> LvFrame {
        let prompt = u8::from(self.lcd_power_prompt);
        let ack = if prompt != 0 { 0x0D } else { 0x00 };
        LvFrame::new(SMART_KEY_CAN_ADDR, [0x81, 0, 0, 0, 0, 0, prompt, ack])
    }

    fn animations_frame(&self) -> LvFrame {
        let belt = if self.seat_belt_icon { 0x50 } else { 0x00 };
        LvFrame::new(
            ANIMATIONS_CAN_ADDR,
            [
                0x10,
                0,
                0,
                0,
                self.lcd_brightness.into(),
                self.dash_animation_mask(),
                0x08,
                belt,
            ],
        )
    }

    fn dash_animation_mask(&self) -> u8 {
        let base = if self.animate_startup { 0x00 } else { 0x40 };
        base | self.trunk_open as u8
            | (self.rear_left_door as u8) << 2
            | (self.rear_right_door as u8) << 3
            | (self.front_right_door as u8) << 4
            | (self.front_left_door as u8) << 5
    }

    fn engine_prompts_frame(&self) -> LvFrame {
        LvFrame::new(
            ENGINE_PROMPTS_CAN_ADDR,
            [
                0,
                0,
                0,
                0,
                0,
                0,
                self.engine_stopped_code.into(),
                self.check_engine_prompt.into(),
            ],
        )
    }

    /// Whole/fractional degree split; gets within a degree on the display.
    fn outdoor_temp_frame(&self) -> LvFrame {
        let temp_c = (self.outside_temperature_f - 32) as f32 * 5.0 / 9.0;
        let centi = (temp_c * 100.0) as i32;
        let upper = (centi / 100 + 48) as u8;
        let lower = (centi % 100) as u8;
        LvFrame::new(OUTDOOR_TEMP_CAN_ADDR, [0, 0, 0, upper, 0, lower, 0, 0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::RecordingBus;

    /// Runs one tick right after construction so every shadow matches its
    /// live value and the periodic timers have just fired.
    fn synced_cluster() -> (CamryCluster, u32) {
        let mut cluster = CamryCluster::new();
        let mut bus = RecordingBus::new();
        cluster.send_can_data(&mut bus, 1_000_000);
        (cluster, 1_000_000)
    }

    fn ids(bus: &RecordingBus) -> heapless::Vec<u32, 32> {
        bus.sent.iter().map(|f| f.raw_id()).collect()
    }

    #[test]
    fn first_call_fires_every_watched_frame_without_waiting() {
        let mut cluster = CamryCluster::new();
        let mut bus = RecordingBus::new();
        // now == 0: no periodic tier has elapsed, only edge triggers run.
        cluster.send_can_data(&mut bus, 0);
        assert_eq!(&ids(&bus)[..], &[0x3B7, 0x622, 0x3B1, 0x3BB, 0x400]);
    }

    #[test]
    fn all_tiers_fire_once_elapsed_and_stay_quiet_within_the_fast_window() {
        let (mut cluster, now) = synced_cluster();
        let mut bus = RecordingBus::new();

        cluster.send_can_data(&mut bus, now.wrapping_add(1000));
        // 2 fast (economy suppressed in Park) + 5 medium + 10 slow.
        assert_eq!(bus.sent.len(), 17);

        let mut bus = RecordingBus::new();
        cluster.send_can_data(&mut bus, now.wrapping_add(1010));
        assert!(bus.sent.is_empty());

        let mut bus = RecordingBus::new();
        cluster.send_can_data(&mut bus, now.wrapping_add(1030));
        assert_eq!(&ids(&bus)[..], &[0x32C, 0xB4]);
    }

    #[test]
    fn headlight_change_fires_the_lighting_frame_immediately() {
        let (mut cluster, now) = synced_cluster();
        let mut bus = RecordingBus::new();

        cluster.headlight = true;
        cluster.send_can_data(&mut bus, now.wrapping_add(5));

        assert_eq!(bus.sent.len(), 1);
        assert_eq!(bus.sent[0].raw_id(), 0x622);
        assert_eq!(bus.sent[0].data(), &[0x12, 0, 0xE8, 0x20, 0, 0, 0, 0]);

        // The shadow updated; nothing more goes out next call.
        let mut bus = RecordingBus::new();
        cluster.send_can_data(&mut bus, now.wrapping_add(10));
        assert!(bus.sent.is_empty());
    }

    #[test]
    fn brake_icon_edge_frame_differs_from_the_periodic_one() {
        let (mut cluster, now) = synced_cluster();
        let mut bus = RecordingBus::new();

        cluster.brake_icon = true;
        cluster.send_can_data(&mut bus, now.wrapping_add(5));
        assert_eq!(bus.sent.len(), 1);
        assert_eq!(bus.sent[0].data(), &[0x40, 0, 0, 0, 0, 0, 0, 0]);

        let mut bus = RecordingBus::new();
        cluster.send_can_data(&mut bus, now.wrapping_add(250));
        let periodic_abs = bus
            .sent
            .iter()
            .find(|f| f.raw_id() == 0x3B7)
            .expect("periodic ABS frame");
        assert_eq!(periodic_abs.data(), &[0x40, 0, 0, 0, 0, 0, 0, 0x08]);
    }

    #[test]
    fn motor_temperature_change_fires_the_engine_control_frame() {
        let (mut cluster, now) = synced_cluster();
        let mut bus = RecordingBus::new();

        cluster.motor_temp_deg_c = 80;
        cluster.send_can_data(&mut bus, now.wrapping_add(5));
        assert_eq!(bus.sent.len(), 1);
        assert_eq!(bus.sent[0].raw_id(), 0x3BB);
        // 80 C lands the dial at 80 * 1.59 + 65 = 192.
        assert_eq!(bus.sent[0].data(), &[0x40, 0, 192, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn speed_frame_encodes_the_dial_mask() {
        let (mut cluster, now) = synced_cluster();
        cluster.speed_gauge = 60;

        let mut bus = RecordingBus::new();
        cluster.send_can_data(&mut bus, now.wrapping_add(25));
        let speed = bus
            .sent
            .iter()
            .find(|f| f.raw_id() == 0xB4)
            .expect("speed frame");
        // 60 * 160 = 9600 = 0x2580.
        assert_eq!(speed.data()[5], 0x25);
        assert_eq!(speed.data()[6], 0x80);
        assert_eq!(speed.data()[7], 0xBC);
    }

    #[test]
    fn economy_frame_is_suppressed_in_park() {
        let (mut cluster, now) = synced_cluster();

        let mut bus = RecordingBus::new();
        cluster.send_can_data(&mut bus, now.wrapping_add(25));
        assert!(!ids(&bus).contains(&0x1C4));

        cluster.drive_mode = DriveMode::Forward;
        cluster.eco_gauge = 100;
        cluster.eco_leaf = true;
        let mut bus = RecordingBus::new();
        cluster.send_can_data(&mut bus, now.wrapping_add(50));
        let economy = bus
            .sent
            .iter()
            .find(|f| f.raw_id() == 0x1C4)
            .expect("economy frame");
        // Full bar mask plus the leaf bits.
        assert_eq!(economy.data()[6], 0xFC);
    }

    #[test]
    fn transmission_frame_encodes_gear_and_mode() {
        let (mut cluster, now) = synced_cluster();
        cluster.drive_mode = DriveMode::Sport;
        cluster.sport_mode = true;
        cluster.gear_number = 3;

        let mut bus = RecordingBus::new();
        cluster.send_can_data(&mut bus, now.wrapping_add(250));
        let transmission = bus
            .sent
            .iter()
            .find(|f| f.raw_id() == 0x3BC)
            .expect("transmission frame");
        assert_eq!(transmission.data(), &[0, 0x09, 0, 0, 0x30, 0x80, 0, 0x10]);
    }

    #[test]
    fn outdoor_temperature_splits_whole_and_fraction() {
        let (mut cluster, now) = synced_cluster();
        cluster.outside_temperature_f = 72;

        let mut bus = RecordingBus::new();
        cluster.send_can_data(&mut bus, now.wrapping_add(1000));
        let temp = bus
            .sent
            .iter()
            .find(|f| f.raw_id() == 0x3B0)
            .expect("outdoor temperature frame");
        // 72 F is 22.22 C: whole part 22 (+48 offset), fraction 22/100.
        assert_eq!(temp.data()[3], 70);
        assert_eq!(temp.data()[5], 22);
    }

    #[test]
    fn initialize_rearms_every_edge_trigger() {
        let (mut cluster, _now) = synced_cluster();
        cluster.initialize();

        let mut bus = RecordingBus::new();
        // Timers restarted with the clock: periodic tiers wait out their
        // periods again, but every watched frame fires straight away.
        cluster.send_can_data(&mut bus, 0);
        assert_eq!(&ids(&bus)[..], &[0x3B7, 0x622, 0x3B1, 0x3BB, 0x400]);
    }

    #[test]
    fn smart_key_frame_acknowledges_active_prompts() {
        let (mut cluster, now) = synced_cluster();
        cluster.lcd_power_prompt = PowerPrompt::IgnitionPrompt;

        let mut bus = RecordingBus::new();
        cluster.send_can_data(&mut bus, now.wrapping_add(1000));
        let smart_key = bus
            .sent
            .iter()
            .find(|f| f.raw_id() == 0x633)
            .expect("smart key frame");
        assert_eq!(smart_key.data(), &[0x81, 0, 0, 0, 0, 0, 0x50, 0x0D]);
    }
}
