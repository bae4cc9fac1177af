//! Desktop simulator for the brewsense coffee-maker and pressure firmware.
//!
//! Runs brewsense-core against simulated hardware on the host:
//!
//! - a coffee maker panel that shifts its LED word out on the clock/data/strobe
//!   bus, reacts to presses on the button matrix lines and now and then cuts a
//!   word short;
//! - an MPRLS transducer on an in-memory I2C bus that is busy for 5 ms after
//!   each conversion command and NACKs every fifth read. Its counts follow
//!   the configured calibration, so published pressure tracks the waveform.
//!
//! Both components are polled by the core scheduler for a few seconds while a
//! short script switches the machine on and requests drinks. Published values
//! are logged at the end. The default log level is info; set `RUST_LOG=debug`
//! to follow every cycle.

use core::cell::Cell;
use core::convert::Infallible;
use std::process::ExitCode;
use std::rc::Rc;

use embassy_futures::block_on;
use embassy_futures::join::join3;
use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};
use log::{info, warn};

use brewsense_core::async_i2c_bus::{SharedBus, SharedBusDevice};
use brewsense_core::buttons::{Button, ButtonControl, ButtonLine, ButtonPanel};
use brewsense_core::calibration::{CalibrationProfile, MAX_RAW_COUNT, TransferMode};
use brewsense_core::config::{
    CoffeeMakerConfig, DeviceConfig, OutputSelection, PressureSensorConfig, ResolvedPins,
};
use brewsense_core::outputs::{CoffeeMakerSinks, NumericSink, OutputId, SensorRegistry};
use brewsense_core::sampling::{COFFEE_MAKER_WORD_WIDTH, SharedSampler, StrobeListener};
use brewsense_core::scheduler::{PollingTask, ShutdownSignal, run_pair};
use brewsense_core::sensors::{CoffeeMaker, PressureSensor};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Time between two panel words (the panel's scan period)
const STROBE_PERIOD: Duration = Duration::from_millis(2);

/// Total simulated run time
const RUN_TIME: Duration = Duration::from_millis(3_000);

/// The panel cuts every this many words short
const TRUNCATED_WORD_EVERY: u32 = 97;

/// Conversion time of the simulated MPRLS
const CONVERSION_TIME: Duration = Duration::from_millis(5);

/// The simulated MPRLS NACKs every this many reads
const NACK_EVERY: u32 = 5;

// ---------------------------------------------------------------------------
// Simulated GPIO
// ---------------------------------------------------------------------------

/// Output line whose level the simulated panel can observe
#[derive(Clone)]
struct SimPin {
    name: &'static str,
    inverted: bool,
    level: Rc<Cell<bool>>,
}

impl SimPin {
    fn new(name: &'static str, inverted: bool) -> Self {
        Self {
            name,
            inverted,
            level: Rc::new(Cell::new(inverted)),
        }
    }

    /// Whether the line is at its active level
    fn is_active(&self) -> bool {
        self.level.get() != self.inverted
    }

    fn drive(&mut self, level: bool) {
        if self.level.replace(level) != level {
            log::debug!("GPIO {} -> {}", self.name, if level { "high" } else { "low" });
        }
    }
}

impl PinErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulated coffee maker panel
// ---------------------------------------------------------------------------

/// Drink the panel is currently making
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Brewing {
    Coffee { until: u32 },
    HotWater { until: u32 },
}

struct SimulatedPanel {
    frame: u32,
    brewing: Option<Brewing>,
    buttons_a: Option<SimPin>,
    buttons_b: Option<SimPin>,
}

impl SimulatedPanel {
    fn new(buttons_a: Option<SimPin>, buttons_b: Option<SimPin>) -> Self {
        Self {
            frame: 0,
            brewing: None,
            buttons_a,
            buttons_b,
        }
    }

    fn pressed(line: &Option<SimPin>) -> bool {
        line.as_ref().is_some_and(SimPin::is_active)
    }

    fn update_brewing(&mut self) {
        let frame = self.frame;
        let a = Self::pressed(&self.buttons_a);
        let b = Self::pressed(&self.buttons_b);
        match (a, b, self.brewing) {
            (true, true, None) => {
                info!("Panel: hot water button seen");
                self.brewing = Some(Brewing::HotWater { until: frame + 300 });
            }
            (true, false, None) | (false, true, None) => {
                info!("Panel: brew button seen");
                self.brewing = Some(Brewing::Coffee { until: frame + 400 });
            }
            (_, _, Some(Brewing::Coffee { until } | Brewing::HotWater { until })) if frame >= until => {
                self.brewing = None;
            }
            _ => {}
        }
    }

    /// LED word for the current frame, in the bit layout of panel revision 1
    fn word(&self) -> u64 {
        let frame = self.frame;
        let mut word = 0u64;

        match self.brewing {
            None => word |= 0b11,
            Some(Brewing::HotWater { .. }) => word |= 1 << 2,
            Some(Brewing::Coffee { .. }) => {}
        }
        // Water-empty LED blinks at half the scan rate after the first second
        if frame > 500 && frame % 4 < 2 {
            word |= 1 << 3;
        }
        // Quantity and flavor selections step slowly
        word |= 1 << (8 + (frame / 350) % 3);
        word |= 1 << (11 + (frame / 600) % 3);
        word
    }

    /// Shift out one word per strobe period until `running` is cleared
    async fn run(
        &mut self,
        sampler: &SharedSampler<COFFEE_MAKER_WORD_WIDTH>,
        listener: &dyn StrobeListener,
        running: &Cell<bool>,
    ) {
        while running.get() {
            self.update_brewing();
            let word = self.word();

            if let Err(e) = sampler.on_strobe(Instant::now()).into_result() {
                log::debug!("Panel: {}", e);
            }
            listener.on_strobe();

            let bits = if self.frame % TRUNCATED_WORD_EVERY == TRUNCATED_WORD_EVERY - 1 {
                5
            } else {
                COFFEE_MAKER_WORD_WIDTH
            };
            for index in 0..bits {
                sampler.on_clock(word & (1 << index) != 0);
            }

            self.frame += 1;
            Timer::after(STROBE_PERIOD).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Simulated MPRLS
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SimI2cError(ErrorKind);

impl embedded_hal::i2c::Error for SimI2cError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

struct SimulatedMprls {
    address: u8,
    /// Transfer function the firmware is configured with
    profile: CalibrationProfile,
    started: Instant,
    conversion_started: Option<Instant>,
    reads: u32,
}

impl SimulatedMprls {
    fn new(address: u8, profile: CalibrationProfile) -> Self {
        Self {
            address,
            profile,
            started: Instant::now(),
            conversion_started: None,
            reads: 0,
        }
    }

    /// Pressure waveform over the middle 80 % of the calibrated range with a
    /// 2 s period
    fn pressure(&self) -> f32 {
        let t = (Instant::now() - self.started).as_millis() as f32 / 1000.0;
        let mid = (self.profile.output_min + self.profile.output_max) / 2.0;
        let amplitude = 0.4 * (self.profile.output_max - self.profile.output_min);
        mid + amplitude * (t * core::f32::consts::PI).sin()
    }

    /// Inverse of the configured profile, so the firmware reads back the
    /// simulated pressure
    fn counts(&self) -> u32 {
        let p = &self.profile;
        let fraction = (self.pressure() - p.output_min) / (p.output_max - p.output_min);
        let raw = p.pressure_min + fraction * (p.pressure_max - p.pressure_min);
        (raw.round().max(0.0) as u32).min(MAX_RAW_COUNT)
    }

    fn answer(&mut self, buffer: &mut [u8]) -> Result<(), SimI2cError> {
        self.reads += 1;
        if self.reads % NACK_EVERY == 0 {
            return Err(SimI2cError(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)));
        }

        let busy = self
            .conversion_started
            .is_some_and(|started| Instant::now() - started < CONVERSION_TIME);
        let status = 0x40 | if busy { 0x20 } else { 0x00 };
        let counts = self.counts().to_be_bytes();
        let frame = [status, counts[1], counts[2], counts[3]];

        let len = buffer.len().min(frame.len());
        buffer[..len].copy_from_slice(&frame[..len]);
        Ok(())
    }
}

impl ErrorType for SimulatedMprls {
    type Error = SimI2cError;
}

impl I2c for SimulatedMprls {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(SimI2cError(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)));
        }
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    if bytes.first() == Some(&0xAA) {
                        self.conversion_started = Some(Instant::now());
                    }
                }
                Operation::Read(buffer) => self.answer(buffer)?,
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Setup helpers
// ---------------------------------------------------------------------------

fn simulator_config() -> DeviceConfig {
    DeviceConfig {
        coffee_maker: Some(CoffeeMakerConfig {
            update_interval_ms: 250,
            averaging_window: 20,
            button_press_strobes: 10,
            outputs: OutputSelection {
                grind_disabled: false,
                ..OutputSelection::default()
            },
            ..CoffeeMakerConfig::default()
        }),
        pressure_sensor: Some(PressureSensorConfig {
            update_interval_ms: 200,
            transfer: TransferMode::PercentOfFullScale,
            ..PressureSensorConfig::default()
        }),
    }
}

/// Round-trip the configuration through its postcard blob, the way the
/// firmware receives it
fn load_config() -> Option<DeviceConfig> {
    let bytes = match simulator_config().to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Could not encode the simulator configuration: {}", e);
            return None;
        }
    };
    info!("Configuration blob: {} bytes", bytes.len());
    DeviceConfig::load(&bytes).ok()
}

fn button_panel(pins: &ResolvedPins) -> (ButtonPanel<SimPin>, Option<SimPin>, Option<SimPin>) {
    let a = pins.buttons_a.map(|pin| SimPin::new("buttons_a", pin.inverted));
    let b = pins.buttons_b.map(|pin| SimPin::new("buttons_b", pin.inverted));
    let onoff = ButtonLine::new(
        SimPin::new("button_onoff", pins.button_onoff.inverted),
        "button_onoff",
        pins.button_onoff.inverted,
    );

    let panel = match (a.clone(), b.clone()) {
        (Some(a), Some(b)) => ButtonPanel::new(
            ButtonLine::new(a.clone(), "buttons_a", a.inverted),
            ButtonLine::new(b.clone(), "buttons_b", b.inverted),
            onoff,
        ),
        _ => ButtonPanel::onoff_only(onoff),
    };
    (panel, a, b)
}

/// Scripted user: brew a coffee, then ask for hot water, then stop
async fn user_script(
    controls: &ButtonControl<SimPin>,
    running: &Cell<bool>,
    shutdown: &ShutdownSignal,
) {
    let started = Instant::now();

    Timer::after_millis(600).await;
    if let Err(e) = controls.request(Button::OneCup) {
        warn!("One cup request failed: {}", e);
    }

    Timer::after_millis(1_400).await;
    if let Err(e) = controls.request(Button::HotWater) {
        warn!("Hot water request failed: {}", e);
    }

    Timer::at(started + RUN_TIME).await;
    info!("Stopping simulation");
    running.set(false);
    shutdown.signal(());
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting brewsense simulator");

    let Some(config) = load_config() else {
        return ExitCode::FAILURE;
    };
    let (Some(coffee_config), Some(pressure_config)) = (config.coffee_maker, config.pressure_sensor)
    else {
        log::error!("The simulator needs both components configured");
        return ExitCode::FAILURE;
    };
    coffee_config.log_config();
    pressure_config.log_config();

    // Validated by DeviceConfig::load
    let Ok(pins) = coffee_config.pins.resolve() else {
        return ExitCode::FAILURE;
    };

    let registry = SensorRegistry::new();
    let sampler = SharedSampler::<COFFEE_MAKER_WORD_WIDTH>::new(coffee_config.averaging_window);
    let (panel_lines, buttons_a, buttons_b) = button_panel(&pins);
    let controls = ButtonControl::new(panel_lines, coffee_config.button_press_strobes);

    let mut coffee_maker = CoffeeMaker::new(
        &sampler,
        &controls,
        CoffeeMakerSinks::from_selection(&coffee_config.outputs, &registry),
    );

    let profile = match pressure_config.profile() {
        Ok(profile) => profile,
        Err(e) => {
            log::error!("Pressure calibration rejected: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let bus = SharedBus::new(SimulatedMprls::new(pressure_config.address, profile));
    let pressure_sink = pressure_config
        .publish
        .then(|| Box::new(registry.numeric(OutputId::Pressure)) as Box<dyn NumericSink>);
    let pressure = match PressureSensor::new(SharedBusDevice::new(&bus), &pressure_config, pressure_sink) {
        Ok(pressure) => pressure,
        Err(e) => {
            log::error!("Pressure sensor rejected its configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = coffee_maker.setup().and_then(|()| coffee_maker.set_enabled(true)) {
        log::error!("Coffee maker setup failed: {}", e);
        return ExitCode::FAILURE;
    }

    let mut coffee_task = PollingTask::new(
        coffee_maker,
        Duration::from_millis(u64::from(coffee_config.update_interval_ms)),
    );
    let mut pressure_task = PollingTask::new(
        pressure,
        Duration::from_millis(u64::from(pressure_config.update_interval_ms)),
    );

    let shutdown = ShutdownSignal::new();
    let running = Cell::new(true);
    let mut panel = SimulatedPanel::new(buttons_a, buttons_b);

    block_on(async {
        if let Err(e) = pressure_task.sensor_mut().setup().await {
            warn!("Continuing without an initial conversion: {}", e);
        }
        join3(
            run_pair(&mut coffee_task, &mut pressure_task, &shutdown),
            panel.run(&sampler, &controls, &running),
            user_script(&controls, &running, &shutdown),
        )
        .await;
    });

    // -----------------------------------------------------------------------
    // Report
    // -----------------------------------------------------------------------
    info!("Published outputs:");
    registry.log_state();

    let sampling = sampler.stats();
    info!(
        "Sampler: {} strobes, {} words, {} desyncs ({} bits discarded)",
        sampling.strobes, sampling.words, sampling.desyncs, sampling.discarded_bits
    );
    info!("Button presses completed: {}", controls.completed_presses());
    for (name, stats) in [
        ("coffee maker", coffee_task.stats()),
        ("pressure", pressure_task.stats()),
    ] {
        info!(
            "Task {}: {} cycles, {} published, {} skipped, {} missed deadlines",
            name, stats.cycles, stats.published, stats.skipped, stats.missed_deadlines
        );
    }

    info!("Simulator exiting");
    ExitCode::SUCCESS
}
