use presence_core::exti::avr::{Atmega328p, AvrExtInt};
use presence_core::exti::{Edge, PhysicalLine};
use presence_core::indicator::IndicatorPolarity;
use presence_core::sim::{SimAvrRegisters, SimBoard};
use presence_core::telemetry::PresenceEvent;
use presence_core::timer::ticks_from_micros;

type Board = SimBoard<AvrExtInt<Atmega328p, SimAvrRegisters>>;

const PERIOD: u16 = 20_000;
const PERIOD_TICKS: u32 = 20_000;
const PULSE_LINE: PhysicalLine = PhysicalLine(0);

fn booted(polarity: IndicatorPolarity) -> Board {
    let mut board = SimBoard::new(AvrExtInt::new(SimAvrRegisters::new()), polarity, PERIOD);
    board.boot_with(0, 0);
    board
}

fn asserted_count(board: &Board) -> usize {
    board
        .telemetry()
        .oldest_first()
        .filter(|record| record.event == PresenceEvent::PresenceAsserted)
        .count()
}

#[test]
fn twenty_ms_period_is_twenty_thousand_ticks_at_8mhz_over_8() {
    assert_eq!(ticks_from_micros(8_000_000, 8, 20_000), Some(PERIOD));
}

#[test]
fn ten_ms_pulses_keep_indicator_dark_then_silence_lights_it() {
    let mut board = booted(IndicatorPolarity::ActiveHigh);

    for _ in 0..20 {
        assert!(board.pulse(PULSE_LINE, 100));
        assert!(!board.is_indicator_on());
        assert_eq!(board.advance(PERIOD_TICKS / 2 - 100), 0);
        assert!(!board.is_indicator_on());
    }
    let snapshot = board.snapshot();
    assert!(!snapshot.present);
    assert_eq!(snapshot.pulses, 20);
    assert_eq!(snapshot.timeouts, 0);
    assert_eq!(board.instant().ticks(), 200_000);

    // Last falling edge was at 190 ms; the countdown runs out at 210 ms.
    assert_eq!(board.advance(PERIOD_TICKS / 2 - 1), 0);
    assert!(!board.is_indicator_on());
    assert_eq!(board.advance(1), 1);
    assert!(board.is_indicator_on());

    board.advance(5 * PERIOD_TICKS);
    assert!(board.is_indicator_on());

    board.pulse(PULSE_LINE, 100);
    assert!(!board.is_indicator_on());
    assert!(!board.snapshot().present);
}

#[test]
fn gap_of_one_period_yields_exactly_one_timeout() {
    let mut board = booted(IndicatorPolarity::ActiveHigh);
    board.inject_edge(PULSE_LINE, Edge::Falling);
    board.inject_edge(PULSE_LINE, Edge::Rising);

    assert_eq!(board.advance(2 * PERIOD_TICKS - 1), 1);
    assert!(board.snapshot().present);

    board.pulse(PULSE_LINE, 100);
    assert!(!board.snapshot().present);
    assert_eq!(asserted_count(&board), 1);
}

#[test]
fn long_silence_asserts_presence_once_and_keeps_rearming() {
    let mut board = booted(IndicatorPolarity::ActiveLow);

    assert_eq!(board.advance(7 * PERIOD_TICKS / 2), 3);
    let snapshot = board.snapshot();
    assert!(snapshot.present);
    assert!(snapshot.indicator_on);
    assert_eq!(snapshot.timeouts, 3);
    assert_eq!(asserted_count(&board), 1);
    assert_eq!(board.monitor().timer().rearms(), 3);

    // Active-low: lit means the pin is driven low.
    assert!(!board.monitor().indicator().pin().level());
}

#[test]
fn first_pulse_clears_indicator_left_lit_by_lamp_check() {
    let mut board = SimBoard::new(
        AvrExtInt::<Atmega328p, _>::new(SimAvrRegisters::new()),
        IndicatorPolarity::ActiveHigh,
        PERIOD,
    );
    let lit = board.boot_with(3, 1_000);
    assert!(lit);
    assert!(board.is_indicator_on());
    assert!(!board.snapshot().present);

    board.pulse(PULSE_LINE, 100);
    assert!(!board.is_indicator_on());

    let cleared = board
        .telemetry()
        .latest()
        .copied()
        .expect("pulse recorded");
    assert_eq!(cleared.event, PresenceEvent::PresenceCleared);
}

#[test]
fn lamp_check_left_lit_then_timeout_keeps_indicator_lit() {
    let mut board = SimBoard::new(
        AvrExtInt::<Atmega328p, _>::new(SimAvrRegisters::new()),
        IndicatorPolarity::ActiveHigh,
        PERIOD,
    );
    assert!(board.boot_with(1, 1_000));

    assert_eq!(board.advance(PERIOD_TICKS), 1);
    assert!(board.is_indicator_on());
    assert!(board.snapshot().present);
    assert_eq!(asserted_count(&board), 0);
}

#[test]
fn full_boot_lamp_check_ends_dark() {
    let mut board = SimBoard::new(
        AvrExtInt::<Atmega328p, _>::new(SimAvrRegisters::new()),
        IndicatorPolarity::ActiveHigh,
        PERIOD,
    );
    assert!(!board.boot());
    assert_eq!(board.monitor().indicator().pin().writes(), 10);
    assert_eq!(board.instant().ticks(), 10_000_000);
}

#[test]
fn pulse_train_at_half_period_never_times_out() {
    let mut board = booted(IndicatorPolarity::ActiveHigh);
    assert_eq!(board.pulse_train(PERIOD_TICKS / 2, 40), 40);
    assert_eq!(board.snapshot().timeouts, 0);

    // Each 50 ms gap holds two full periods before the next pulse.
    assert_eq!(board.pulse_train(PERIOD_TICKS * 5 / 2, 2), 2);
    assert_eq!(board.snapshot().timeouts, 4);
    assert_eq!(asserted_count(&board), 2);
}
