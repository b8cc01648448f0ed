//! Fixed-capacity callback table keyed by logical channel.

use super::{
    DeviceFamily, InterruptController, InterruptHandler, MAX_CHANNELS, PhysicalLine, TriggerMode,
};

/// One slot of the dispatch table.
pub struct InterruptChannel<'h, Ctx> {
    handler: Option<&'h dyn InterruptHandler<Ctx>>,
    mode: TriggerMode,
}

impl<Ctx> Clone for InterruptChannel<'_, Ctx> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Ctx> Copy for InterruptChannel<'_, Ctx> {}

impl<'h, Ctx> InterruptChannel<'h, Ctx> {
    /// Slot with no handler and the reset trigger mode.
    pub const EMPTY: Self = Self {
        handler: None,
        mode: TriggerMode::Low,
    };

    #[must_use]
    pub fn handler(&self) -> Option<&'h dyn InterruptHandler<Ctx>> {
        self.handler
    }

    #[must_use]
    pub const fn mode(&self) -> TriggerMode {
        self.mode
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.handler.is_some()
    }
}

/// Routes hardware interrupt lines to handlers registered per logical channel.
///
/// The registry owns the controller so every table mutation and its register
/// writes happen together. Callers keep the registry inside their device
/// context and reach it through a critical section.
pub struct DispatchRegistry<'h, C, Ctx> {
    controller: C,
    channels: [InterruptChannel<'h, Ctx>; MAX_CHANNELS],
}

impl<'h, C, Ctx> DispatchRegistry<'h, C, Ctx>
where
    C: InterruptController,
{
    const FITS: () = assert!(
        <C::Family as DeviceFamily>::LINES.len() <= MAX_CHANNELS,
        "device family exposes more lines than the dispatch table holds"
    );

    /// Creates an empty table; no line is touched until [`Self::attach`].
    #[must_use]
    pub fn new(controller: C) -> Self {
        let () = Self::FITS;
        Self {
            controller,
            channels: [InterruptChannel::EMPTY; MAX_CHANNELS],
        }
    }

    /// Number of logical channels the family exposes.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        C::Family::channel_count()
    }

    /// Binds `handler` to `channel`, configures the trigger and unmasks the
    /// line. Out-of-range channels are ignored.
    pub fn attach(
        &mut self,
        channel: u8,
        handler: &'h dyn InterruptHandler<Ctx>,
        mode: TriggerMode,
    ) {
        let Some(slot) = self.slot_mut(channel) else {
            return;
        };
        *slot = InterruptChannel {
            handler: Some(handler),
            mode,
        };
        self.controller.configure_edge_trigger(channel, mode);
        self.controller.enable(channel);
    }

    /// Masks the line, then forgets its handler. Out-of-range channels are
    /// ignored.
    pub fn detach(&mut self, channel: u8) {
        if self.slot_mut(channel).is_none() {
            return;
        }
        self.controller.disable(channel);
        if let Some(slot) = self.slot_mut(channel) {
            slot.handler = None;
        }
    }

    /// Entry point for a hardware vector. Returns `true` when a handler ran;
    /// unmapped lines and empty channels are dropped.
    pub fn dispatch(&self, line: PhysicalLine, context: &mut Ctx) -> bool {
        match C::Family::channel_for(line).and_then(|channel| self.handler_for(channel)) {
            Some(handler) => {
                handler.invoke(context);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn channel(&self, channel: u8) -> Option<&InterruptChannel<'h, Ctx>> {
        self.slot(channel)
    }

    #[must_use]
    pub fn handler_for(&self, channel: u8) -> Option<&'h dyn InterruptHandler<Ctx>> {
        self.slot(channel).and_then(InterruptChannel::handler)
    }

    #[must_use]
    pub fn is_attached(&self, channel: u8) -> bool {
        self.slot(channel)
            .is_some_and(InterruptChannel::is_attached)
    }

    #[must_use]
    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    fn slot(&self, channel: u8) -> Option<&InterruptChannel<'h, Ctx>> {
        let index = usize::from(channel);
        if index >= C::Family::channel_count() {
            return None;
        }
        self.channels.get(index)
    }

    fn slot_mut(&mut self, channel: u8) -> Option<&mut InterruptChannel<'h, Ctx>> {
        let index = usize::from(channel);
        if index >= C::Family::channel_count() {
            return None;
        }
        self.channels.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exti::RegisterFile;
    use crate::exti::avr::{Atmega328p, Atmega2560, AvrExtInt, AvrRegister};
    use crate::sim::SimAvrRegisters;

    #[derive(Default)]
    struct Hits {
        first: u32,
        second: u32,
    }

    fn hit_first(hits: &mut Hits) {
        hits.first += 1;
    }

    fn hit_second(hits: &mut Hits) {
        hits.second += 1;
    }

    const FIRST: fn(&mut Hits) = hit_first;
    const SECOND: fn(&mut Hits) = hit_second;

    type Registry328p = DispatchRegistry<'static, AvrExtInt<Atmega328p, SimAvrRegisters>, Hits>;

    fn registry() -> Registry328p {
        DispatchRegistry::new(AvrExtInt::new(SimAvrRegisters::new()))
    }

    #[test]
    fn attach_configures_and_routes_by_physical_line() {
        let mut registry = registry();
        let mut hits = Hits::default();

        registry.attach(0, &FIRST, TriggerMode::Falling);
        registry.attach(1, &SECOND, TriggerMode::Rising);

        assert_eq!(
            registry.controller().trigger_mode(0),
            Some(TriggerMode::Falling)
        );
        assert!(registry.controller().is_enabled(1));

        assert!(registry.dispatch(PhysicalLine(1), &mut hits));
        assert!(registry.dispatch(PhysicalLine(0), &mut hits));
        assert!(registry.dispatch(PhysicalLine(0), &mut hits));
        assert_eq!((hits.first, hits.second), (2, 1));
    }

    #[test]
    fn detached_channel_is_masked_and_silent() {
        let mut registry = registry();
        let mut hits = Hits::default();

        registry.attach(0, &FIRST, TriggerMode::Falling);
        registry.detach(0);

        assert!(!registry.controller().is_enabled(0));
        assert!(!registry.is_attached(0));
        assert!(!registry.dispatch(PhysicalLine(0), &mut hits));
        assert_eq!(hits.first, 0);
    }

    #[test]
    fn attach_at_channel_count_changes_nothing() {
        let mut registry = registry();
        let before = registry.controller().registers().clone();

        registry.attach(2, &FIRST, TriggerMode::Rising);
        registry.detach(2);

        assert_eq!(registry.controller().registers(), &before);
        assert!((0..=2).all(|channel| !registry.is_attached(channel)));
        assert!(registry.channel(2).is_none());
    }

    #[test]
    fn unmapped_or_empty_lines_are_dropped() {
        let mut registry = registry();
        let mut hits = Hits::default();

        assert!(!registry.dispatch(PhysicalLine(0), &mut hits));
        registry.attach(0, &FIRST, TriggerMode::Change);
        assert!(!registry.dispatch(PhysicalLine(5), &mut hits));
        assert_eq!(hits.first, 0);
    }

    #[test]
    fn mega_channel_zero_is_int4() {
        let mut registry: DispatchRegistry<'static, AvrExtInt<Atmega2560, SimAvrRegisters>, Hits> =
            DispatchRegistry::new(AvrExtInt::new(SimAvrRegisters::new()));
        let mut hits = Hits::default();

        registry.attach(0, &FIRST, TriggerMode::Falling);

        let regs = registry.controller().registers();
        assert_eq!(regs.read(AvrRegister::Eicrb), 0b10);
        assert_eq!(regs.read(AvrRegister::Eimsk), 1 << 4);
        assert!(registry.dispatch(PhysicalLine(4), &mut hits));
        assert!(!registry.dispatch(PhysicalLine(0), &mut hits));
        assert_eq!(hits.first, 1);
        assert_eq!(registry.channel_count(), 8);
    }
}
