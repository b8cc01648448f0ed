//! AVR external interrupt (`INTn`) families.
//!
//! AVR parts configure each `INTn` line through a two-bit `ISCn1:0` sense
//! field and unmask it through one bit in a mask register. Register names,
//! field positions, mask-bit numbering, and the logical-to-physical channel
//! order all differ between families, so each family carries its own table.

use core::marker::PhantomData;

use super::{
    DeviceFamily, InterruptController, MAX_CHANNELS, PhysicalLine, RegisterFile, TriggerMode,
};

/// External-interrupt registers found across AVR families.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AvrRegister {
    Eicra,
    Eicrb,
    Mcucr,
    Eimsk,
    Gicr,
    Gimsk,
}

impl AvrRegister {
    /// Number of modelled registers.
    pub const COUNT: usize = 6;

    /// Dense index for register models.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            AvrRegister::Eicra => 0,
            AvrRegister::Eicrb => 1,
            AvrRegister::Mcucr => 2,
            AvrRegister::Eimsk => 3,
            AvrRegister::Gicr => 4,
            AvrRegister::Gimsk => 5,
        }
    }

    const fn holds_sense_fields(self) -> bool {
        matches!(
            self,
            AvrRegister::Eicra | AvrRegister::Eicrb | AvrRegister::Mcucr
        )
    }

    const fn holds_mask_bits(self) -> bool {
        matches!(
            self,
            AvrRegister::Eimsk | AvrRegister::Gicr | AvrRegister::Gimsk
        )
    }
}

/// Wiring of one `INTn` line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AvrLine {
    pub int: PhysicalLine,
    pub sense: AvrRegister,
    pub sense_shift: u8,
    pub mask: AvrRegister,
    pub mask_bit: u8,
}

impl AvrLine {
    #[must_use]
    pub const fn new(
        int: u8,
        sense: AvrRegister,
        sense_shift: u8,
        mask: AvrRegister,
        mask_bit: u8,
    ) -> Self {
        Self {
            int: PhysicalLine(int),
            sense,
            sense_shift,
            mask,
            mask_bit,
        }
    }

    const fn sense_mask(&self) -> u8 {
        0b11 << self.sense_shift
    }

    const fn mask_value(&self) -> u8 {
        1 << self.mask_bit
    }
}

/// Checks a family table: fields fit their registers, sense fields sit in
/// sense registers, mask bits in mask registers, and no line appears twice.
#[must_use]
pub const fn layout_is_valid(lines: &[AvrLine]) -> bool {
    if lines.is_empty() || lines.len() > MAX_CHANNELS {
        return false;
    }

    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if !line.sense.holds_sense_fields() || !line.mask.holds_mask_bits() {
            return false;
        }
        if line.sense_shift > 6 || line.sense_shift % 2 != 0 || line.mask_bit > 7 {
            return false;
        }

        let mut j = i + 1;
        while j < lines.len() {
            if lines[j].int.0 == line.int.0 {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

/// ATmega48/88/168/328 family: `INT0`/`INT1` in `EICRA`/`EIMSK`.
#[derive(Copy, Clone, Debug)]
pub struct Atmega328p;

impl DeviceFamily for Atmega328p {
    type Line = AvrLine;
    const NAME: &'static str = "atmega328p";
    const LINES: &'static [AvrLine] = &[
        AvrLine::new(0, AvrRegister::Eicra, 0, AvrRegister::Eimsk, 0),
        AvrLine::new(1, AvrRegister::Eicra, 2, AvrRegister::Eimsk, 1),
    ];

    fn physical(line: &AvrLine) -> PhysicalLine {
        line.int
    }
}

/// ATmega1280/2560 family. Logical channels 0 and 1 land on `INT4`/`INT5`,
/// which is where the board headers put the first two interrupt pins.
#[derive(Copy, Clone, Debug)]
pub struct Atmega2560;

impl DeviceFamily for Atmega2560 {
    type Line = AvrLine;
    const NAME: &'static str = "atmega2560";
    const LINES: &'static [AvrLine] = &[
        AvrLine::new(4, AvrRegister::Eicrb, 0, AvrRegister::Eimsk, 4),
        AvrLine::new(5, AvrRegister::Eicrb, 2, AvrRegister::Eimsk, 5),
        AvrLine::new(0, AvrRegister::Eicra, 0, AvrRegister::Eimsk, 0),
        AvrLine::new(1, AvrRegister::Eicra, 2, AvrRegister::Eimsk, 1),
        AvrLine::new(2, AvrRegister::Eicra, 4, AvrRegister::Eimsk, 2),
        AvrLine::new(3, AvrRegister::Eicra, 6, AvrRegister::Eimsk, 3),
        AvrLine::new(6, AvrRegister::Eicrb, 4, AvrRegister::Eimsk, 6),
        AvrLine::new(7, AvrRegister::Eicrb, 6, AvrRegister::Eimsk, 7),
    ];

    fn physical(line: &AvrLine) -> PhysicalLine {
        line.int
    }
}

/// ATmega32U4: `INT0..INT3` plus `INT6` as the fifth channel.
#[derive(Copy, Clone, Debug)]
pub struct Atmega32u4;

impl DeviceFamily for Atmega32u4 {
    type Line = AvrLine;
    const NAME: &'static str = "atmega32u4";
    const LINES: &'static [AvrLine] = &[
        AvrLine::new(0, AvrRegister::Eicra, 0, AvrRegister::Eimsk, 0),
        AvrLine::new(1, AvrRegister::Eicra, 2, AvrRegister::Eimsk, 1),
        AvrLine::new(2, AvrRegister::Eicra, 4, AvrRegister::Eimsk, 2),
        AvrLine::new(3, AvrRegister::Eicra, 6, AvrRegister::Eimsk, 3),
        AvrLine::new(6, AvrRegister::Eicrb, 4, AvrRegister::Eimsk, 6),
    ];

    fn physical(line: &AvrLine) -> PhysicalLine {
        line.int
    }
}

/// ATmega8/16/32: sense bits in `MCUCR`, mask bits 6/7 of `GICR`.
#[derive(Copy, Clone, Debug)]
pub struct Atmega8;

impl DeviceFamily for Atmega8 {
    type Line = AvrLine;
    const NAME: &'static str = "atmega8";
    const LINES: &'static [AvrLine] = &[
        AvrLine::new(0, AvrRegister::Mcucr, 0, AvrRegister::Gicr, 6),
        AvrLine::new(1, AvrRegister::Mcucr, 2, AvrRegister::Gicr, 7),
    ];

    fn physical(line: &AvrLine) -> PhysicalLine {
        line.int
    }
}

/// ATtiny25/45/85: a single `INT0` in `MCUCR`/`GIMSK`.
#[derive(Copy, Clone, Debug)]
pub struct Attiny85;

impl DeviceFamily for Attiny85 {
    type Line = AvrLine;
    const NAME: &'static str = "attiny85";
    const LINES: &'static [AvrLine] = &[AvrLine::new(
        0,
        AvrRegister::Mcucr,
        0,
        AvrRegister::Gimsk,
        6,
    )];

    fn physical(line: &AvrLine) -> PhysicalLine {
        line.int
    }
}

const _: () = assert!(layout_is_valid(Atmega328p::LINES));
const _: () = assert!(layout_is_valid(Atmega2560::LINES));
const _: () = assert!(layout_is_valid(Atmega32u4::LINES));
const _: () = assert!(layout_is_valid(Atmega8::LINES));
const _: () = assert!(layout_is_valid(Attiny85::LINES));

/// [`InterruptController`] for any AVR family over an 8-bit register file.
pub struct AvrExtInt<F, R> {
    registers: R,
    _family: PhantomData<F>,
}

impl<F, R> AvrExtInt<F, R>
where
    F: DeviceFamily<Line = AvrLine>,
    R: RegisterFile<Register = AvrRegister, Word = u8>,
{
    const LAYOUT_OK: () = assert!(layout_is_valid(F::LINES), "unsupported AVR family layout");

    #[must_use]
    pub fn new(registers: R) -> Self {
        let () = Self::LAYOUT_OK;
        Self {
            registers,
            _family: PhantomData,
        }
    }

    #[must_use]
    pub fn registers(&self) -> &R {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.registers
    }
}

impl<F, R> InterruptController for AvrExtInt<F, R>
where
    F: DeviceFamily<Line = AvrLine>,
    R: RegisterFile<Register = AvrRegister, Word = u8>,
{
    type Family = F;

    fn configure_edge_trigger(&mut self, channel: u8, mode: TriggerMode) {
        let Some(line) = F::line(channel) else {
            return;
        };
        let field = line.sense_mask();
        let bits = mode.sense_bits() << line.sense_shift;
        self.registers
            .modify(line.sense, |value| (value & !field) | bits);
    }

    fn enable(&mut self, channel: u8) {
        if let Some(line) = F::line(channel) {
            let bit = line.mask_value();
            self.registers.modify(line.mask, |value| value | bit);
        }
    }

    fn disable(&mut self, channel: u8) {
        if let Some(line) = F::line(channel) {
            let bit = line.mask_value();
            self.registers.modify(line.mask, |value| value & !bit);
        }
    }

    fn trigger_mode(&self, channel: u8) -> Option<TriggerMode> {
        let line = F::line(channel)?;
        let value = self.registers.read(line.sense);
        Some(TriggerMode::from_sense_bits(value >> line.sense_shift))
    }

    fn is_enabled(&self, channel: u8) -> bool {
        F::line(channel)
            .is_some_and(|line| self.registers.read(line.mask) & line.mask_value() != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimAvrRegisters;

    fn controller<F>() -> AvrExtInt<F, SimAvrRegisters>
    where
        F: DeviceFamily<Line = AvrLine>,
    {
        AvrExtInt::new(SimAvrRegisters::new())
    }

    #[test]
    fn atmega328p_writes_sense_field_and_mask_bit() {
        let mut exti = controller::<Atmega328p>();

        exti.configure_edge_trigger(1, TriggerMode::Falling);
        exti.enable(1);

        assert_eq!(exti.registers().read(AvrRegister::Eicra), 0b0000_1000);
        assert_eq!(exti.registers().read(AvrRegister::Eimsk), 0b0000_0010);
        assert_eq!(exti.trigger_mode(1), Some(TriggerMode::Falling));
        assert!(exti.is_enabled(1));
        assert!(!exti.is_enabled(0));
    }

    #[test]
    fn reconfiguring_preserves_neighbouring_fields() {
        let mut exti = controller::<Atmega32u4>();
        exti.configure_edge_trigger(0, TriggerMode::Rising);
        exti.configure_edge_trigger(3, TriggerMode::Change);
        exti.configure_edge_trigger(0, TriggerMode::Low);

        assert_eq!(exti.registers().read(AvrRegister::Eicra), 0b0100_0000);
        assert_eq!(exti.trigger_mode(0), Some(TriggerMode::Low));
        assert_eq!(exti.trigger_mode(3), Some(TriggerMode::Change));
    }

    #[test]
    fn atmega2560_remaps_first_channels_to_int4_and_int5() {
        let mut exti = controller::<Atmega2560>();
        exti.configure_edge_trigger(0, TriggerMode::Falling);
        exti.enable(0);

        assert_eq!(exti.registers().read(AvrRegister::Eicrb), 0b0000_0010);
        assert_eq!(exti.registers().read(AvrRegister::Eicra), 0);
        assert_eq!(exti.registers().read(AvrRegister::Eimsk), 1 << 4);
        assert_eq!(Atmega2560::channel_for(PhysicalLine(4)), Some(0));
        assert_eq!(Atmega2560::channel_for(PhysicalLine(0)), Some(2));
    }

    #[test]
    fn atmega32u4_channel_four_is_int6() {
        let mut exti = controller::<Atmega32u4>();
        exti.configure_edge_trigger(4, TriggerMode::Rising);
        exti.enable(4);

        assert_eq!(exti.registers().read(AvrRegister::Eicrb), 0b0011_0000);
        assert_eq!(exti.registers().read(AvrRegister::Eimsk), 1 << 6);
        assert_eq!(Atmega32u4::channel_for(PhysicalLine(6)), Some(4));
        assert_eq!(Atmega32u4::channel_for(PhysicalLine(4)), None);
    }

    #[test]
    fn atmega8_uses_gicr_bits_six_and_seven() {
        let mut exti = controller::<Atmega8>();
        exti.enable(0);
        exti.enable(1);
        assert_eq!(exti.registers().read(AvrRegister::Gicr), 0b1100_0000);

        exti.disable(0);
        assert_eq!(exti.registers().read(AvrRegister::Gicr), 0b1000_0000);
        assert!(!exti.is_enabled(0));
        assert!(exti.is_enabled(1));
    }

    #[test]
    fn attiny85_ignores_channels_beyond_int0() {
        let mut exti = controller::<Attiny85>();
        exti.configure_edge_trigger(1, TriggerMode::Rising);
        exti.enable(1);

        assert_eq!(exti.registers().read(AvrRegister::Mcucr), 0);
        assert_eq!(exti.registers().read(AvrRegister::Gimsk), 0);
        assert_eq!(exti.trigger_mode(1), None);
    }

    #[test]
    fn layout_validation_rejects_malformed_tables() {
        let duplicate = [
            AvrLine::new(0, AvrRegister::Eicra, 0, AvrRegister::Eimsk, 0),
            AvrLine::new(0, AvrRegister::Eicra, 2, AvrRegister::Eimsk, 1),
        ];
        let misplaced = [AvrLine::new(0, AvrRegister::Eimsk, 0, AvrRegister::Eicra, 0)];
        let odd_shift = [AvrLine::new(0, AvrRegister::Eicra, 1, AvrRegister::Eimsk, 0)];

        assert!(!layout_is_valid(&duplicate));
        assert!(!layout_is_valid(&misplaced));
        assert!(!layout_is_valid(&odd_shift));
        assert!(!layout_is_valid(&[]));
    }
}
