//! Song façade (§4.8, §2 component 9): the high-level controls effects
//! use to mutate sequencing/tempo/global volume without holding a
//! reference to the scheduler itself.

/// Feature toggles a caller (sink) may disable, e.g. to guarantee the
/// premix pipeline terminates.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledFeatures {
    pub pattern_loop: bool,
}

/// Pending sequencing directives raised by effects during a row; the
/// scheduler consumes and clears these at the end of the row (§4.5 step 6).
#[derive(Clone, Copy, Debug, Default)]
pub struct PendingJump {
    pub order: Option<usize>,
    pub row: Option<usize>,
}

#[derive(Clone, Copy, Debug)]
pub struct PatternLoop {
    pub start_row: usize,
    pub end_row: Option<usize>,
    pub count: u32,
    pub total: u32,
    pub enabled: bool,
}

impl Default for PatternLoop {
    fn default() -> Self {
        Self {
            start_row: 0,
            end_row: None,
            count: 0,
            total: 0,
            enabled: false,
        }
    }
}

/// Global, song-wide mutable state that effects read and write.
pub struct SongFacade {
    pub tempo: u16,
    pub ticks_per_row: u8,
    /// Extra ticks added to the current row only (S3M `SCx`).
    pub extra_row_ticks: u8,
    /// Row-repeat count from `SEx`/pattern-delay; first effect in the
    /// row to set this wins (§4.5 tie-break).
    pub pattern_delay: Option<u8>,
    pub global_volume: u8,
    pub pending_jump: PendingJump,
    pub pattern_loop: PatternLoop,
    pub disabled: DisabledFeatures,
    pub stop_requested: bool,
    /// Row the scheduler is currently ingesting; set before each row's
    /// effects run so `SB0` can stamp the loop-start mark at the right
    /// row instead of always row 0.
    pub current_row: usize,
}

impl SongFacade {
    pub fn new(initial_tempo: u16, initial_speed: u8) -> Self {
        Self {
            tempo: initial_tempo,
            ticks_per_row: initial_speed,
            extra_row_ticks: 0,
            pattern_delay: None,
            global_volume: 64,
            pending_jump: PendingJump::default(),
            pattern_loop: PatternLoop::default(),
            disabled: DisabledFeatures::default(),
            stop_requested: false,
            current_row: 0,
        }
    }

    pub fn set_current_order(&mut self, order: usize) {
        self.pending_jump.order = Some(order);
    }

    pub fn set_next_row(&mut self, row: usize) {
        self.pending_jump.row = Some(row);
    }

    pub fn set_tempo(&mut self, bpm: u16) {
        self.tempo = bpm.max(1);
    }

    pub fn increase_tempo(&mut self, delta: u16) {
        self.tempo = self.tempo.saturating_add(delta);
    }

    pub fn decrease_tempo(&mut self, delta: u16) {
        self.tempo = self.tempo.saturating_sub(delta).max(1);
    }

    pub fn set_ticks(&mut self, n: u8) {
        self.ticks_per_row = n.max(1);
    }

    pub fn add_row_ticks(&mut self, n: u8) {
        self.extra_row_ticks = self.extra_row_ticks.saturating_add(n);
    }

    /// First-wins: only the first call within a row sets the delay.
    pub fn set_pattern_delay(&mut self, n: u8) {
        if self.pattern_delay.is_none() {
            self.pattern_delay = Some(n);
        }
    }

    pub fn set_pattern_loop_start(&mut self, row: usize) {
        self.pattern_loop.start_row = row;
        self.pattern_loop.end_row = None;
        self.pattern_loop.count = 0;
    }

    pub fn set_pattern_loop_end(&mut self, row: usize, repeat_count: u32) {
        if !self.can_pattern_loop() {
            return;
        }
        self.pattern_loop.end_row = Some(row);
        self.pattern_loop.total = repeat_count;
        self.pattern_loop.enabled = true;
    }

    pub fn global_volume(&self) -> u8 {
        self.global_volume
    }

    pub fn set_global_volume(&mut self, vol: u8) {
        self.global_volume = vol.min(64);
    }

    pub fn disable_features(&mut self, disabled: DisabledFeatures) {
        self.disabled = disabled;
    }

    pub fn can_pattern_loop(&self) -> bool {
        !self.disabled.pattern_loop
    }

    /// Reset the per-row-only fields; called at the start of each row
    /// (§4.5 step 3/4).
    pub fn begin_row(&mut self) {
        self.extra_row_ticks = 0;
        self.pattern_delay = None;
        self.pending_jump = PendingJump::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_delay_is_first_wins() {
        let mut facade = SongFacade::new(125, 6);
        facade.set_pattern_delay(3);
        facade.set_pattern_delay(9);
        assert_eq!(facade.pattern_delay, Some(3));
    }

    #[test]
    fn begin_row_clears_per_row_fields_not_tempo() {
        let mut facade = SongFacade::new(125, 6);
        facade.set_tempo(140);
        facade.set_pattern_delay(2);
        facade.add_row_ticks(4);
        facade.begin_row();
        assert_eq!(facade.tempo, 140);
        assert_eq!(facade.pattern_delay, None);
        assert_eq!(facade.extra_row_ticks, 0);
    }

    #[test]
    fn set_current_order_and_next_row_combine() {
        // Open question resolution: order-jump and row-jump on the same
        // row combine into "jump to order X, row Y".
        let mut facade = SongFacade::new(125, 6);
        facade.set_current_order(4);
        facade.set_next_row(2);
        assert_eq!(facade.pending_jump.order, Some(4));
        assert_eq!(facade.pending_jump.row, Some(2));
    }

    #[test]
    fn pattern_loop_disabled_by_feature_flag_is_ignored() {
        let mut facade = SongFacade::new(125, 6);
        facade.disable_features(DisabledFeatures { pattern_loop: true });
        facade.set_pattern_loop_start(0);
        facade.set_pattern_loop_end(3, 2);
        assert!(!facade.pattern_loop.enabled);
    }
}
