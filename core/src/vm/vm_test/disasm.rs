use super::*;
use crate::vm::{DECODE_ERROR_NOTE, Operand, ValueStats};

fn opcode_map() -> OpcodeMap {
    [
        (
            STRICT_EQUAL as u32,
            OpcodeMeta::new("STRICT_EQUAL", "===", OperandClass::Binary, true),
        ),
        (HALT as u32, OpcodeMeta::new("HALT", "halt", OperandClass::Nullary, false)),
        (JUMP as u32, OpcodeMeta::new("JUMP", "goto", OperandClass::Jump, false)),
    ]
    .into_iter()
    .collect()
}

#[test]
fn skips_unknown_positions() {
    let program = vec![99, STRICT_EQUAL, 22, 22, slot(3), HALT, -4, HALT];
    let map = opcode_map();
    let decoder = ConstantDecoder::default();
    let dis = Disassembler::new(&program, &map, &decoder);
    let out = dis.disassemble();

    assert_eq!(out.total_bytecode, 8);
    assert_eq!(out.instructions_disassembled, 3);
    assert_eq!(out.skipped, 2);
    let first = &out.instructions[0];
    assert_eq!(first.address, 1);
    assert_eq!(first.name, "STRICT_EQUAL");
    assert_eq!(
        first.operands,
        vec![
            Operand::Const(Constant::Bool(true)),
            Operand::Const(Constant::Bool(true)),
            Operand::Dest(3),
        ]
    );
    assert_eq!(out.instructions[1].address, 5);
    assert_eq!(out.instructions[2].address, 7);
}

#[test]
fn decode_errors_are_recorded_and_scan_continues() {
    // the string length overruns the program, so 2 and 40 are rescanned as data
    let program = vec![STRICT_EQUAL, 2, 40, JUMP, int(0)];
    let map = opcode_map();
    let decoder = ConstantDecoder::default();
    let out = Disassembler::new(&program, &map, &decoder).disassemble();

    assert_eq!(out.instructions_disassembled, 2);
    let broken = &out.instructions[0];
    assert_eq!(broken.note.as_deref(), Some(DECODE_ERROR_NOTE));
    assert_eq!(broken.operands, vec![Operand::Raw(2)]);
    assert_eq!(out.decode_errors(), 1);
    assert_eq!(out.instructions[1].name, "JUMP");
    assert_eq!(out.instructions[1].operands, vec![Operand::Const(Constant::SmallInt(0))]);
}

#[test]
fn iterator_is_lazy_limited_and_restartable() {
    let program = vec![HALT, HALT, HALT, HALT];
    let map = opcode_map();
    let decoder = ConstantDecoder::default();
    let dis = Disassembler::new(&program, &map, &decoder).with_limit(3);

    let first: Vec<_> = dis.instructions().collect();
    let second: Vec<_> = dis.instructions().collect();
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert_eq!(dis.instructions().nth(1).map(|i| i.address), Some(1));
}

#[test]
fn histogram_and_listing() {
    let program = vec![HALT, STRICT_EQUAL, 5, 36, slot(2), HALT];
    let map = opcode_map();
    let decoder = ConstantDecoder::default();
    let out = Disassembler::new(&program, &map, &decoder).disassemble();

    let histogram = out.histogram();
    assert_eq!(histogram.entries[0].name, "HALT");
    assert_eq!(histogram.count(HALT), 2);
    assert_eq!(histogram.count(STRICT_EQUAL), 1);
    assert_eq!(histogram.count(JUMP), 0);

    let listing = out.to_string();
    assert!(listing.starts_with("IP    | OPCODE | INSTRUCTION"));
    assert!(listing.contains("STRICT_EQUAL"));
    assert!(listing.contains("=== 2 null -> v2"));
}

#[test]
fn artifact_shape_is_camel_case() {
    let program = vec![HALT];
    let map = opcode_map();
    let decoder = ConstantDecoder::default();
    let out = Disassembler::new(&program, &map, &decoder).disassemble();
    let json = serde_json::to_value(&out).unwrap();
    assert_eq!(json["totalBytecode"], 1);
    assert_eq!(json["instructionsDisassembled"], 1);
    assert_eq!(json["instructions"][0]["name"], "HALT");
    assert!(json.get("skipped").is_none());
}

#[test]
fn value_stats_classify_raw_values() {
    let program = vec![1, 3, 22, 22, 200, -6];
    let stats = ValueStats::of(&program, 2, &opcode_map(), &TagTable::default());
    assert_eq!(stats.length, 6);
    assert_eq!(stats.unique, 5);
    assert_eq!(stats.small_ints, 2);
    assert_eq!(stats.likely_opcodes, 2);
    assert_eq!(stats.other, 2);
    assert_eq!(stats.min, Some(-6));
    assert_eq!(stats.max, Some(200));
    assert_eq!(stats.top.len(), 2);
    assert_eq!(stats.top[0].value, 22);
    assert_eq!(stats.top[0].label.as_deref(), Some("TRUE"));
    // ties are ordered by value
    assert_eq!(stats.top[1].value, -6);
    assert!(stats.to_string().contains("Small integers (odd values): 2"));
}
