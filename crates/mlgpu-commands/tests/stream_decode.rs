use mlgpu_commands::commands::{AluInstruction, AluOperand, MiLoadRegisterImm, MiMath, PipeControl};
use mlgpu_commands::stream::{decode_all, dwords_from_le_bytes, CommandIter};
use mlgpu_commands::{Command, CommandBuffer, CommandKind, CommandSink, Error, Generation};

fn sample_stream(gen: Generation) -> Vec<u32> {
    let mut buf = CommandBuffer::new(gen);
    buf.load_register_imm(0x2600, 0xDEAD_BEEF).unwrap();
    buf.pipe_control(&PipeControl::timestamp(0x2000)).unwrap();
    buf.math(&MiMath::new(vec![
        AluInstruction::load(AluOperand::SrcA, AluOperand::Gpr(0)),
        AluInstruction::load1(AluOperand::SrcB),
        AluInstruction::and(),
        AluInstruction::store(AluOperand::Gpr(3), AluOperand::Accu),
    ]))
    .unwrap();
    buf.store_data_imm_qword(0x2010, 0x0123_4567_89AB_CDEF).unwrap();
    buf.report_perf_count(0x3000, 9).unwrap();
    buf.batch_buffer_end().unwrap();
    buf.finish()
}

#[test]
fn decodes_every_command_in_order() {
    let gen = Generation::Gen12;
    let words = sample_stream(gen);
    let decoded = decode_all(gen, &words).unwrap();

    let kinds: Vec<CommandKind> = decoded.iter().map(|d| d.command.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            CommandKind::MiLoadRegisterImm,
            CommandKind::PipeControl,
            CommandKind::MiMath,
            CommandKind::MiStoreDataImm,
            CommandKind::MiReportPerfCount,
            CommandKind::MiBatchBufferEnd,
        ]
    );
    let offsets: Vec<usize> = decoded.iter().map(|d| d.offset_dwords).collect();
    assert_eq!(offsets, vec![0, 3, 9, 14, 19, 23]);

    assert_eq!(
        decoded[0].command,
        Command::MiLoadRegisterImm(MiLoadRegisterImm {
            register_offset: 0x2600,
            data: 0xDEAD_BEEF,
            ..Default::default()
        })
    );
    assert_eq!(decoded[1].command, Command::PipeControl(PipeControl::timestamp(0x2000)));
}

#[test]
fn re_encoding_decoded_commands_reproduces_the_stream() {
    let gen = Generation::Gen9;
    let words = sample_stream(gen);
    let mut again = Vec::new();
    for raw in CommandIter::new(gen, &words) {
        let raw = raw.unwrap();
        again.extend(raw.decode().unwrap().encode(gen).unwrap());
    }
    assert_eq!(again, words);
}

#[test]
fn trailing_commands_after_batch_buffer_end_are_skipped() {
    let gen = Generation::Gen12;
    let mut words = sample_stream(gen);
    words.extend([0x1100_0001, 0x2600, 1]);
    assert_eq!(decode_all(gen, &words).unwrap().len(), 6);
    assert_eq!(
        CommandIter::new(gen, &words)
            .stop_at_batch_buffer_end(false)
            .count(),
        7
    );
}

#[test]
fn unknown_command_stops_decoding() {
    // MI_BATCH_BUFFER_START is not in the supported set.
    let words = [0, 0x1880_0001, 0, 0];
    let err = decode_all(Generation::Gen12, &words).unwrap_err();
    assert_eq!(err, Error::UnknownCommand { dw0: 0x1880_0001 });
}

#[test]
fn truncated_command_reports_offset() {
    let words = [0x0500_0000u32];
    assert!(decode_all(Generation::Gen9, &words).is_ok());

    let words = [0, 0x7A00_0004, 0, 0];
    assert_eq!(
        decode_all(Generation::Gen9, &words).unwrap_err(),
        Error::Truncated {
            kind: CommandKind::PipeControl,
            offset: 1,
            needed: 6,
            available: 3,
        }
    );
}

#[test]
fn byte_input_is_little_endian() {
    let bytes = [0x00, 0x00, 0x00, 0x05];
    let words = dwords_from_le_bytes(&bytes).unwrap();
    assert_eq!(
        decode_all(Generation::Gen9, &words).unwrap()[0].command.kind(),
        CommandKind::MiBatchBufferEnd
    );
    assert_eq!(dwords_from_le_bytes(&bytes[..3]), Err(Error::UnalignedLength { len: 3 }));
}

#[test]
fn display_is_a_single_readable_line() {
    let gen = Generation::Gen12;
    let words = sample_stream(gen);
    let decoded = decode_all(gen, &words).unwrap();
    assert_eq!(
        decoded[0].command.to_string(),
        "MI_LOAD_REGISTER_IMM reg=0x2600 data=0xdeadbeef"
    );
    assert_eq!(
        decoded[2].command.to_string(),
        "MI_MATH LOAD SRCA, R0; LOAD1 SRCB; AND; STORE R3, ACCU"
    );
}
