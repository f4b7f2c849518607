#![cfg(feature = "serde")]

use mlgpu_commands::commands::PipeControl;
use mlgpu_commands::query::HwCountersReportLayout;
use mlgpu_commands::stream::decode_all;
use mlgpu_commands::{CommandBuffer, CommandSink, Generation};
use serde_json::json;

#[test]
fn decoded_commands_serialize_with_tag_and_fields() {
    let gen = Generation::Gen12;
    let mut buf = CommandBuffer::new(gen);
    buf.load_register_imm(0x2358, 7).unwrap();
    buf.pipe_control(&PipeControl::timestamp(0x1000)).unwrap();
    buf.batch_buffer_end().unwrap();

    let decoded = decode_all(gen, buf.as_dwords()).unwrap();
    let value = serde_json::to_value(&decoded).unwrap();

    assert_eq!(value[0]["offset_dwords"], json!(0));
    assert_eq!(value[0]["command"]["command"], json!("MiLoadRegisterImm"));
    assert_eq!(value[0]["command"]["fields"]["register_offset"], json!(0x2358));
    assert_eq!(value[0]["words"], json!([0x1100_0001u32, 0x2358, 7]));

    assert_eq!(value[1]["command"]["fields"]["flags"], json!(["CS_STALL"]));
    assert_eq!(value[1]["command"]["fields"]["post_sync"], json!("WriteTimestamp"));
    assert_eq!(value[2]["command"]["command"], json!("MiBatchBufferEnd"));
}

#[test]
fn report_layout_serializes() {
    let layout = HwCountersReportLayout::new(Generation::Gen9, 1).unwrap();
    let value = serde_json::to_value(layout).unwrap();
    assert_eq!(value["end_tag"], json!(520));
    assert_eq!(value["total_size"], json!(528));
}
