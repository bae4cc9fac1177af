use embedded_hal::digital::OutputPin;

use super::Sensor;
use crate::buttons::{Button, ButtonControl};
use crate::decoder::{COFFEE_MAKER_LAYOUT, DerivedReadings, StatusFlags, WordLayout, decode_with};
use crate::error::{ConfigError, Error, Result};
use crate::outputs::CoffeeMakerSinks;
use crate::sampling::{COFFEE_MAKER_WORD_WIDTH, SamplerStats, SerialWord, SharedSampler};

const DEVICE: &str = "coffee maker";

type Word = SerialWord<COFFEE_MAKER_WORD_WIDTH>;

/// One decoded poll of the coffee maker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoffeeMakerReadings {
    pub flags: StatusFlags,
    pub readings: DerivedReadings,
    pub word: Word,
    /// No new settled word arrived since the last poll; `word` is the
    /// previous one
    pub stale: bool,
}

/// Coffee maker component: drains the shared sampler, decodes and publishes
/// the panel state, and owns the enable switch.
pub struct CoffeeMaker<'a, P> {
    sampler: &'a SharedSampler<COFFEE_MAKER_WORD_WIDTH>,
    controls: &'a ButtonControl<P>,
    layout: &'static WordLayout,
    sinks: CoffeeMakerSinks,
    last_word: Option<Word>,
    last_stats: SamplerStats,
}

impl<'a, P: OutputPin> CoffeeMaker<'a, P> {
    pub fn new(
        sampler: &'a SharedSampler<COFFEE_MAKER_WORD_WIDTH>,
        controls: &'a ButtonControl<P>,
        sinks: CoffeeMakerSinks,
    ) -> Self {
        Self {
            sampler,
            controls,
            layout: &COFFEE_MAKER_LAYOUT,
            sinks,
            last_word: None,
            last_stats: SamplerStats::default(),
        }
    }

    /// Decode with another panel revision's layout
    pub fn with_layout(mut self, layout: &'static WordLayout) -> core::result::Result<Self, ConfigError> {
        layout.validate(COFFEE_MAKER_WORD_WIDTH)?;
        self.layout = layout;
        Ok(self)
    }

    /// Release every line and publish the enable switch as off
    pub fn setup(&mut self) -> Result<()> {
        self.controls.setup()?;
        self.sinks.publish_enable(false);
        log::info!(
            "Coffee maker: layout v{}, {} outputs, averaging over {} strobes",
            self.layout.version,
            self.sinks.configured(),
            self.sampler.averaging_window()
        );
        Ok(())
    }

    pub fn enabled(&self) -> bool {
        self.controls.enabled()
    }

    /// Enable switch write; the new state is published on success
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.controls.set_enabled(enabled)?;
        log::info!("Coffee maker {}", if enabled { "enabled" } else { "disabled" });
        self.sinks.publish_enable(enabled);
        Ok(())
    }

    pub fn request(&self, button: Button) -> Result<()> {
        self.controls.request(button).inspect_err(|e| {
            log::warn!("Coffee maker: {} request rejected: {}", button.name(), e);
        })?;
        log::info!("Coffee maker: {} requested", button.name());
        Ok(())
    }

    fn report_desyncs(&mut self) {
        let stats = self.sampler.stats();
        let desyncs = stats.desyncs.wrapping_sub(self.last_stats.desyncs);
        if desyncs > 0 {
            let discarded = stats.discarded_bits.wrapping_sub(self.last_stats.discarded_bits);
            log::warn!(
                "Coffee maker: {} strobe restarts since last poll, {} bits discarded",
                desyncs,
                discarded
            );
        }
        self.last_stats = stats;
    }

    fn next_word(&mut self) -> Result<(Word, bool)> {
        if let Some(word) = self.sampler.take() {
            self.last_word = Some(word);
            return Ok((word, false));
        }
        match self.last_word {
            Some(word) => {
                log::debug!("Coffee maker: no new word, reusing the previous one");
                Ok((word, true))
            }
            None => Err(Error::NoData { device: DEVICE }),
        }
    }
}

impl<P: OutputPin> Sensor for CoffeeMaker<'_, P> {
    type Readings = CoffeeMakerReadings;

    fn name(&self) -> &'static str {
        DEVICE
    }

    async fn read(&mut self) -> Result<CoffeeMakerReadings> {
        self.report_desyncs();
        let (word, stale) = self.next_word()?;
        let (flags, readings) = decode_with(&word, self.layout);
        log::trace!("Coffee maker word {:#06x}", word.to_lsb_first());
        Ok(CoffeeMakerReadings {
            flags,
            readings,
            word,
            stale,
        })
    }

    fn publish(&mut self, readings: &CoffeeMakerReadings) {
        self.sinks.publish(&readings.flags, &readings.readings);
    }

    fn shutdown(&mut self) {
        self.sampler.reset();
        self.last_word = None;
        if let Err(e) = self.controls.release_all() {
            log::warn!("Coffee maker: releasing lines failed: {}", e);
        }
        self.sinks.publish_enable(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buttons::{ButtonLine, ButtonPanel};
    use crate::decoder::StatusFlag;
    use crate::outputs::{OutputId, SensorRegistry};
    use crate::testing::RecordingPin;
    use embassy_futures::block_on;
    use embassy_time::Instant;

    fn send_word(sampler: &SharedSampler<COFFEE_MAKER_WORD_WIDTH>, value: u64) {
        sampler.on_strobe(Instant::from_ticks(0));
        for index in 0..COFFEE_MAKER_WORD_WIDTH {
            sampler.on_clock(value & (1 << index) != 0);
        }
    }

    fn controls(onoff: &RecordingPin) -> ButtonControl<RecordingPin> {
        ButtonControl::new(
            ButtonPanel::new(
                ButtonLine::new(RecordingPin::new(), "buttons_a", false),
                ButtonLine::new(RecordingPin::new(), "buttons_b", false),
                ButtonLine::new(onoff.clone(), "button_onoff", false),
            ),
            2,
        )
    }

    fn sinks(registry: &SensorRegistry) -> CoffeeMakerSinks {
        CoffeeMakerSinks::from_selection(&crate::config::OutputSelection::default(), registry)
    }

    #[test]
    fn test_no_data_before_first_word() {
        let sampler = SharedSampler::new(1);
        let onoff = RecordingPin::new();
        let controls = controls(&onoff);
        let registry = SensorRegistry::new();
        let mut coffee_maker = CoffeeMaker::new(&sampler, &controls, sinks(&registry));

        assert_eq!(
            block_on(coffee_maker.read()),
            Err(Error::NoData { device: DEVICE })
        );
    }

    #[test]
    fn test_decodes_and_reuses_last_word() {
        let sampler = SharedSampler::new(1);
        let onoff = RecordingPin::new();
        let controls = controls(&onoff);
        let registry = SensorRegistry::new();
        let mut coffee_maker = CoffeeMaker::new(&sampler, &controls, sinks(&registry));

        // one cup ready, 2 cups quantity, medium flavor
        send_word(&sampler, 0b01 | (1 << 10) | (1 << 12));
        let first = block_on(coffee_maker.read()).expect("word available");
        assert!(!first.stale);
        coffee_maker.publish(&first);
        assert_eq!(
            registry.binary_state(OutputId::Flag(StatusFlag::OneCupReady)),
            Some(true)
        );
        assert_eq!(registry.numeric_state(OutputId::CoffeeQuantity), Some(2.0));
        assert_eq!(registry.numeric_state(OutputId::CoffeeFlavor), Some(2.0));

        let second = block_on(coffee_maker.read()).expect("previous word reused");
        assert!(second.stale);
        assert_eq!(second.flags, first.flags);
    }

    #[test]
    fn test_enable_switch_is_published() {
        let sampler = SharedSampler::new(1);
        let onoff = RecordingPin::new();
        let controls = controls(&onoff);
        let registry = SensorRegistry::new();
        let mut coffee_maker = CoffeeMaker::new(&sampler, &controls, sinks(&registry));

        coffee_maker.setup().expect("recording pins never fail");
        assert_eq!(registry.binary_state(OutputId::EnableSwitch), Some(false));
        assert_eq!(coffee_maker.request(Button::OneCup), Err(Error::NotEnabled));

        coffee_maker.set_enabled(true).expect("recording pins never fail");
        assert_eq!(registry.binary_state(OutputId::EnableSwitch), Some(true));
        assert_eq!(onoff.level(), Some(true));
        assert_eq!(coffee_maker.request(Button::HotWater), Ok(()));
    }

    #[test]
    fn test_shutdown_releases_lines_and_drops_words() {
        let sampler = SharedSampler::new(1);
        let onoff = RecordingPin::new();
        let controls = controls(&onoff);
        let registry = SensorRegistry::new();
        let mut coffee_maker = CoffeeMaker::new(&sampler, &controls, sinks(&registry));

        coffee_maker.set_enabled(true).expect("recording pins never fail");
        send_word(&sampler, 0b1);
        block_on(coffee_maker.read()).expect("word available");
        sampler.on_strobe(Instant::from_ticks(1));
        sampler.on_clock(true);

        coffee_maker.shutdown();
        assert_eq!(onoff.level(), Some(false));
        assert!(!coffee_maker.enabled());
        assert_eq!(registry.binary_state(OutputId::EnableSwitch), Some(false));
        assert_eq!(
            block_on(coffee_maker.read()),
            Err(Error::NoData { device: DEVICE })
        );
    }
}
