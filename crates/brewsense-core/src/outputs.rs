//! Published outputs
//!
//! Drivers publish through the [`BinarySink`] and [`NumericSink`] traits and
//! never learn where values end up. The host decides: a home-automation API
//! bridge on the device, or the in-memory [`SensorRegistry`] used by the
//! simulator and the tests.
//!
//! Outputs that are not configured simply have no sink. [`CoffeeMakerSinks`]
//! holds one optional slot per output, filled once at configuration time.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;

use heapless::LinearMap;

use crate::config::OutputSelection;
use crate::decoder::{DerivedReadings, StatusFlag, StatusFlags};

/// Receives boolean states (flags, the enable switch)
pub trait BinarySink {
    fn publish_state(&mut self, state: bool);
}

/// Receives numeric readings
pub trait NumericSink {
    fn publish_state(&mut self, value: f32);
}

/// Name of every value brewsense can publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputId {
    Flag(StatusFlag),
    CoffeeQuantity,
    CoffeeFlavor,
    EnableSwitch,
    Pressure,
}

impl OutputId {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Flag(flag) => flag.name(),
            Self::CoffeeQuantity => "coffee_quantity",
            Self::CoffeeFlavor => "coffee_flavor",
            Self::EnableSwitch => "enable",
            Self::Pressure => "pressure",
        }
    }

    /// Unit of measurement; empty for dimensionless and boolean outputs
    pub const fn unit(self) -> &'static str {
        match self {
            Self::CoffeeQuantity => "cups",
            Self::Pressure => "Pa",
            Self::Flag(_) | Self::CoffeeFlavor | Self::EnableSwitch => "",
        }
    }

    /// Decimals shown for numeric outputs
    pub const fn accuracy_decimals(self) -> usize {
        match self {
            Self::CoffeeQuantity => 1,
            Self::Pressure => 5,
            Self::Flag(_) | Self::CoffeeFlavor | Self::EnableSwitch => 0,
        }
    }
}

/// A value as last seen by the registry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PublishedValue {
    Binary(bool),
    Numeric(f32),
}

impl core::fmt::Display for PublishedValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Binary(state) => write!(f, "{}", if *state { "ON" } else { "OFF" }),
            Self::Numeric(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Record {
    value: PublishedValue,
    publishes: u32,
}

/// Enough for every [`OutputId`]: 8 flags, 2 readings, the switch and pressure
pub const REGISTRY_CAPACITY: usize = 12;

/// In-memory output registry
///
/// Cloning is cheap and every clone shares the same entries, so the sinks
/// handed to the drivers and the code inspecting results see the same data.
#[derive(Clone)]
pub struct SensorRegistry {
    entries: Rc<RefCell<LinearMap<OutputId, Record, REGISTRY_CAPACITY>>>,
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(LinearMap::new())),
        }
    }

    /// Sink publishing a boolean under `id`
    pub fn binary(&self, id: OutputId) -> RegistrySink {
        RegistrySink {
            registry: self.clone(),
            id,
        }
    }

    /// Sink publishing a number under `id`
    pub fn numeric(&self, id: OutputId) -> RegistrySink {
        RegistrySink {
            registry: self.clone(),
            id,
        }
    }

    fn record(&self, id: OutputId, value: PublishedValue) {
        let mut entries = self.entries.borrow_mut();
        if let Some(record) = entries.get_mut(&id) {
            record.value = value;
            record.publishes += 1;
            return;
        }
        if entries
            .insert(
                id,
                Record {
                    value,
                    publishes: 1,
                },
            )
            .is_err()
        {
            log::warn!("Sensor registry full, dropping {}", id.name());
        }
    }

    /// Last value published under `id`
    pub fn get(&self, id: OutputId) -> Option<PublishedValue> {
        self.entries.borrow().get(&id).map(|record| record.value)
    }

    pub fn binary_state(&self, id: OutputId) -> Option<bool> {
        match self.get(id)? {
            PublishedValue::Binary(state) => Some(state),
            PublishedValue::Numeric(_) => None,
        }
    }

    pub fn numeric_state(&self, id: OutputId) -> Option<f32> {
        match self.get(id)? {
            PublishedValue::Numeric(value) => Some(value),
            PublishedValue::Binary(_) => None,
        }
    }

    /// How many times `id` was published
    pub fn publish_count(&self, id: OutputId) -> u32 {
        self.entries
            .borrow()
            .get(&id)
            .map_or(0, |record| record.publishes)
    }

    /// Number of outputs that were published at least once
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log every known output at info level
    pub fn log_state(&self) {
        for (id, record) in self.entries.borrow().iter() {
            log::info!(
                "  {}: {} {} ({} updates)",
                id.name(),
                record.value,
                id.unit(),
                record.publishes
            );
        }
    }
}

/// Sink that writes into a [`SensorRegistry`]
pub struct RegistrySink {
    registry: SensorRegistry,
    id: OutputId,
}

impl BinarySink for RegistrySink {
    fn publish_state(&mut self, state: bool) {
        self.registry.record(self.id, PublishedValue::Binary(state));
    }
}

impl NumericSink for RegistrySink {
    fn publish_state(&mut self, value: f32) {
        self.registry.record(self.id, PublishedValue::Numeric(value));
    }
}

/// Optional sinks of the coffee maker component
#[derive(Default)]
pub struct CoffeeMakerSinks {
    flags: [Option<Box<dyn BinarySink>>; StatusFlag::COUNT],
    coffee_quantity: Option<Box<dyn NumericSink>>,
    coffee_flavor: Option<Box<dyn NumericSink>>,
    enable: Option<Box<dyn BinarySink>>,
}

impl CoffeeMakerSinks {
    /// No outputs at all
    pub fn none() -> Self {
        Self::default()
    }

    /// Registry sinks for every output enabled in `selection`
    pub fn from_selection(selection: &OutputSelection, registry: &SensorRegistry) -> Self {
        let mut sinks = Self::none();
        for flag in StatusFlag::ALL {
            if selection.flag(flag) {
                sinks.flags[flag.index()] = Some(Box::new(registry.binary(OutputId::Flag(flag))));
            }
        }
        if selection.coffee_quantity {
            sinks.coffee_quantity = Some(Box::new(registry.numeric(OutputId::CoffeeQuantity)));
        }
        if selection.coffee_flavor {
            sinks.coffee_flavor = Some(Box::new(registry.numeric(OutputId::CoffeeFlavor)));
        }
        if selection.enable {
            sinks.enable = Some(Box::new(registry.binary(OutputId::EnableSwitch)));
        }
        sinks
    }

    pub fn with_flag(mut self, flag: StatusFlag, sink: impl BinarySink + 'static) -> Self {
        self.flags[flag.index()] = Some(Box::new(sink));
        self
    }

    pub fn with_coffee_quantity(mut self, sink: impl NumericSink + 'static) -> Self {
        self.coffee_quantity = Some(Box::new(sink));
        self
    }

    pub fn with_coffee_flavor(mut self, sink: impl NumericSink + 'static) -> Self {
        self.coffee_flavor = Some(Box::new(sink));
        self
    }

    pub fn with_enable(mut self, sink: impl BinarySink + 'static) -> Self {
        self.enable = Some(Box::new(sink));
        self
    }

    /// Number of configured sinks
    pub fn configured(&self) -> usize {
        self.flags.iter().filter(|slot| slot.is_some()).count()
            + usize::from(self.coffee_quantity.is_some())
            + usize::from(self.coffee_flavor.is_some())
            + usize::from(self.enable.is_some())
    }

    /// Publish one decoded word.
    ///
    /// A reading whose bit group held no valid code is not published, so the
    /// sink keeps its previous value.
    pub fn publish(&mut self, flags: &StatusFlags, readings: &DerivedReadings) {
        for (flag, state) in flags.iter() {
            if let Some(sink) = self.flags[flag.index()].as_mut() {
                sink.publish_state(state);
            }
        }
        if let (Some(sink), Some(value)) = (self.coffee_quantity.as_mut(), readings.coffee_quantity) {
            sink.publish_state(value);
        }
        if let (Some(sink), Some(value)) = (self.coffee_flavor.as_mut(), readings.coffee_flavor) {
            sink.publish_state(value);
        }
    }

    pub fn publish_enable(&mut self, enabled: bool) {
        if let Some(sink) = self.enable.as_mut() {
            sink.publish_state(enabled);
        }
    }
}
