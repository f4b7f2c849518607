//! Query sequences run on the software executor and parsed back from memory.

use mlgpu_commands::exec::{ExecutorConfig, GpuMemory, SoftwareExecutor, SparseMemory};
use mlgpu_commands::query::{HwCountersQuery, PipelineTimestampsQuery, Query, QUERY_END_TAG};
use mlgpu_commands::registers::{cs_gpr, RCS_TIMESTAMP};
use mlgpu_commands::{CommandBuffer, CommandSink, Error, Generation, StatusCode};

const WORKLOAD_COMMANDS: usize = 4;

fn workload<S: CommandSink>(sink: &mut S) {
    for i in 0..WORKLOAD_COMMANDS as u32 {
        sink.load_register_imm(cs_gpr(0).unwrap(), i).unwrap();
    }
}

#[test]
fn pipeline_timestamps_end_to_end() {
    let gen = Generation::Gen12;
    let query = PipelineTimestampsQuery::new(0x1_0000);

    let mut buf = CommandBuffer::new(gen);
    query.write_begin(&mut buf).unwrap();
    workload(&mut buf);
    query.write_end(&mut buf).unwrap();
    buf.batch_buffer_end().unwrap();

    let mut mem = SparseMemory::new();
    let mut exec = SoftwareExecutor::new(gen);
    let report = exec.execute(buf.as_dwords(), &mut mem).unwrap();
    assert!(report.reached_batch_buffer_end);
    assert_eq!(report.commands_executed, 1 + WORKLOAD_COMMANDS + 2 + 1);

    let bytes = mem
        .read_vec(query.report_address, PipelineTimestampsQuery::REPORT_SIZE_BYTES)
        .unwrap();
    let result = query.parse_report(gen, &bytes, None).unwrap();
    // Begin PIPE_CONTROL runs first; end runs after the workload.
    assert_eq!(result.begin, 0);
    assert_eq!(result.timestamp_delta, (1 + WORKLOAD_COMMANDS as u64) * 10);
    assert_eq!(result.timestamp_ns, result.timestamp_delta * 1_000_000_000 / 19_200_000);

    let custom = query.parse_report(gen, &bytes, Some(1_000_000_000)).unwrap();
    assert_eq!(custom.timestamp_ns, 50);
}

#[test]
fn report_is_not_ready_before_end_sequence_runs() {
    let gen = Generation::Gen9;
    let query = PipelineTimestampsQuery::new(0x2000);

    let mut begin = CommandBuffer::new(gen);
    query.write_begin(&mut begin).unwrap();
    let mut end = CommandBuffer::new(gen);
    query.write_end(&mut end).unwrap();

    let mut mem = SparseMemory::new();
    let mut exec = SoftwareExecutor::new(gen);
    exec.execute(begin.as_dwords(), &mut mem).unwrap();

    let bytes = mem.read_vec(0x2000, 24).unwrap();
    let err = query.parse_report(gen, &bytes, None).unwrap_err();
    assert_eq!(err, Error::ReportNotReady { found: 0 });
    assert_eq!(err.status_code(), StatusCode::ReportNotReady);

    exec.execute(end.as_dwords(), &mut mem).unwrap();
    assert_eq!(mem.read_u64(0x2010).unwrap(), QUERY_END_TAG);
    let bytes = mem.read_vec(0x2000, 24).unwrap();
    assert!(query.parse_report(gen, &bytes, None).is_ok());
}

#[test]
fn hw_counters_end_to_end_with_user_registers() {
    let gen = Generation::XeHpg;
    let config = ExecutorConfig {
        ticks_per_command: 3,
        gpu_ticks_per_command: 7,
        context_id: 0x42,
    };
    let query = HwCountersQuery::new(0x4_0000, 0x10).with_user_registers([RCS_TIMESTAMP, cs_gpr(1).unwrap()]);

    let mut buf = CommandBuffer::new(gen);
    query.write_begin(&mut buf).unwrap();
    workload(&mut buf);
    buf.load_register_imm(cs_gpr(1).unwrap(), 1000).unwrap();
    query.write_end(&mut buf).unwrap();
    buf.batch_buffer_end().unwrap();

    let mut mem = SparseMemory::new();
    let mut exec = SoftwareExecutor::with_config(gen, config);
    exec.execute(buf.as_dwords(), &mut mem).unwrap();

    let layout = query.layout(gen).unwrap();
    let bytes = mem.read_vec(query.report_address, layout.total_size).unwrap();
    let result = query.parse_report(gen, &bytes, None).unwrap();

    assert_eq!(result.begin.report_id, 0x10);
    assert_eq!(result.end.report_id, 0x11);
    assert_eq!(result.context_id, 0x42);

    // Between the two RPCs: 2 SRMs, the workload, one LRI, and the end PIPE_CONTROL.
    // Each of those plus the begin RPC itself advances the clocks once.
    let distance = 2 + WORKLOAD_COMMANDS as u64 + 1 + 1 + 1;
    assert_eq!(result.timestamp_delta, distance * 3);
    assert_eq!(result.gpu_ticks_delta, distance * 7);
    assert_eq!(result.user_register_deltas, vec![distance as u32 * 3, 1000]);
}

#[test]
fn mismatched_report_id_is_inconsistent() {
    let gen = Generation::Gen12;
    let query = HwCountersQuery::new(0x4_0000, 5);
    let mut buf = CommandBuffer::new(gen);
    query.write_begin(&mut buf).unwrap();
    query.write_end(&mut buf).unwrap();

    let mut mem = SparseMemory::new();
    SoftwareExecutor::new(gen).execute(buf.as_dwords(), &mut mem).unwrap();

    let layout = query.layout(gen).unwrap();
    let bytes = mem.read_vec(query.report_address, layout.total_size).unwrap();
    let other = HwCountersQuery::new(0x4_0000, 6);
    let err = other.parse_report(gen, &bytes, None).unwrap_err();
    assert!(matches!(err, Error::ReportInconsistent(_)));
    assert_eq!(err.status_code(), StatusCode::ReportInconsistent);
}

#[test]
fn hw_counters_report_address_must_be_64_byte_aligned() {
    let query = HwCountersQuery::new(0x4_0020, 1);
    let mut buf = CommandBuffer::new(Generation::Gen12);
    assert!(matches!(
        query.write_begin(&mut buf),
        Err(Error::MisalignedAddress { alignment: 64, .. })
    ));
}

#[test]
fn oa_timestamp_delta_wraps() {
    let gen = Generation::Gen9;
    let query = HwCountersQuery::new(0, 1);
    let layout = query.layout(gen).unwrap();
    let mut bytes = vec![0u8; layout.total_size];

    let put = |bytes: &mut Vec<u8>, offset: usize, value: u32| {
        bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    };
    put(&mut bytes, layout.begin_oa_report, 1);
    put(&mut bytes, layout.begin_oa_report + 4, 0xFFFF_FFF0);
    put(&mut bytes, layout.end_oa_report, 2);
    put(&mut bytes, layout.end_oa_report + 4, 0x10);
    bytes[layout.end_tag..layout.end_tag + 8].copy_from_slice(&QUERY_END_TAG.to_le_bytes());

    let result = query.parse_report(gen, &bytes, None).unwrap();
    assert_eq!(result.timestamp_delta, 0x20);
}
