//! End-to-end runs of an assembled machine under the pacing threads.

use std::thread;
use std::time::Duration;

use retro_core::cpu_6502::CpuError;
use retro_core::{Machine, MachineError, RunOutcome, SchedulerConfig};

const CONFIG: SchedulerConfig = SchedulerConfig {
    target_hz: 100_000,
    ticks_per_second: 1000,
    report_interval_secs: None,
};

fn kernal(program: &[u8]) -> Vec<u8> {
    let mut image = vec![0xEA; 0x2000];
    image[..program.len()].copy_from_slice(program);
    image[0x1FFC] = 0x00;
    image[0x1FFD] = 0xE0;
    image
}

#[test]
fn paced_run_executes_program_from_rom() {
    #[rustfmt::skip]
    let program = [
        0xA2, 0x00,       // LDX #$00
        0x8A,             // TXA
        0x9D, 0x00, 0x02, // STA $0200,X
        0xE8,             // INX
        0xE0, 0x10,       // CPX #$10
        0xD0, 0xF7,       // BNE -9
        0x4C, 0x0B, 0xE0, // JMP $E00B
    ];
    let mut machine = Machine::builder()
        .rom("kernal", kernal(&program), 0xE000, 13)
        .build()
        .unwrap();

    let control = machine.control();
    let stopper = {
        let control = control.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            control.stop();
        })
    };

    let outcome = machine.run(CONFIG, &control).unwrap();
    stopper.join().unwrap();

    let RunOutcome::Stopped { cycles } = outcome;
    assert!(cycles > 0);
    assert_eq!(cycles, machine.cpu().cycles);
    for i in 0..0x10u16 {
        assert_eq!(machine.ram().peek(0x0200 + i), i as u8);
    }
    assert_eq!(machine.cpu().pc, 0xE00B);

    // Never more than granted, plus the overshoot of one instruction.
    let granted = machine.budget().grants() * CONFIG.quantum() as u64;
    assert!(cycles <= granted + 6, "{} cycles for {} granted", cycles, granted);
}

#[test]
fn fatal_opcode_ends_the_run() {
    let mut machine = Machine::builder()
        .rom("kernal", kernal(&[0xEA, 0x02]), 0xE000, 13)
        .build()
        .unwrap();
    let control = machine.control();

    let err = machine.run(CONFIG, &control).unwrap_err();
    assert!(matches!(
        err,
        MachineError::Cpu(CpuError::UnimplementedOpcode {
            opcode: 0x02,
            pc: 0xE001
        })
    ));
    assert_eq!(machine.cpu().pc, 0xE001);
    assert_eq!(machine.cpu().cycles, 2);
}

#[test]
fn paused_machine_makes_no_progress() {
    let mut machine = Machine::builder()
        .rom("kernal", kernal(&[0x4C, 0x00, 0xE0]), 0xE000, 13)
        .build()
        .unwrap();
    let control = machine.control();
    control.pause();

    let stopper = {
        let control = control.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            control.stop();
        })
    };

    let outcome = machine.run(CONFIG, &control).unwrap();
    stopper.join().unwrap();
    assert_eq!(outcome, RunOutcome::Stopped { cycles: 0 });
}
