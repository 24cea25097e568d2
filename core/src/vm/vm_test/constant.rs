use super::*;

fn decode_one(program: &[i32]) -> (Result<Constant, Fault>, usize) {
    let mut pos = 0;
    let result = decode_constant(program, &mut pos, &TagTable::default(), &CharMode::Identity);
    (result, pos)
}

#[test]
fn decodes_every_tag_in_order() {
    assert_eq!(decode_one(&[5]), (Ok(Constant::SmallInt(2)), 1));
    assert_eq!(decode_one(&[-3]), (Ok(Constant::SmallInt(-2)), 1));
    assert_eq!(decode_one(&[22]), (Ok(Constant::Bool(true)), 1));
    assert_eq!(decode_one(&[38]), (Ok(Constant::Bool(false)), 1));
    assert_eq!(decode_one(&[36]), (Ok(Constant::Null), 1));
    assert_eq!(decode_one(&[64]), (Ok(Constant::VarRef(2)), 1));
    assert_eq!(decode_one(&[2, 2, 104, 105]), (Ok(Constant::Str("hi".to_string())), 4));
}

#[test]
fn float_is_rebuilt_from_two_words() {
    let bits = 1.5f64.to_bits();
    let program = [46, (bits >> 32) as u32 as i32, bits as u32 as i32];
    assert_eq!(decode_one(&program), (Ok(Constant::Float64(1.5)), 3));

    let bits = (-0.1f64).to_bits();
    let program = [46, (bits >> 32) as u32 as i32, bits as u32 as i32];
    assert_eq!(decode_one(&program).0, Ok(Constant::Float64(-0.1)));
}

fn float_words(value: f64) -> [i32; 3] {
    let bits = value.to_bits();
    [46, (bits >> 32) as u32 as i32, bits as u32 as i32]
}

fn decoded_float(value: f64) -> f64 {
    match decode_one(&float_words(value)) {
        (Ok(Constant::Float64(f)), 3) => f,
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn float_special_values_survive_reassembly() {
    let tiny = f64::from_bits(1);
    assert_eq!(decoded_float(tiny).to_bits(), 1);
    assert_eq!(decoded_float(f64::INFINITY), f64::INFINITY);
    assert_eq!(decoded_float(f64::NEG_INFINITY), f64::NEG_INFINITY);
    assert!(decoded_float(f64::NAN).is_nan());

    let zero = decoded_float(-0.0);
    assert_eq!(zero, 0.0);
    assert!(zero.is_sign_negative());
}

#[test]
fn reference_fixtures_decode_with_default_transform() {
    let decoder = ConstantDecoder::default();
    let mut pos = 0;
    assert_eq!(decoder.decode(&[7], &mut pos), Ok(Constant::SmallInt(3)));
    assert_eq!(pos, 1);

    // 1 -> ')', 65 -> 'i', 66 -> 64 | (2706 & 63) = 'R'
    let mut pos = 0;
    assert_eq!(decoder.decode(&[2, 3, 1, 65, 66], &mut pos), Ok(Constant::Str(")iR".to_string())));
    assert_eq!(pos, 5);
}

#[test]
fn truncated_reads_fault_without_moving() {
    for program in [&[46, 1][..], &[2, 5, 104][..], &[2][..], &[][..]] {
        let (result, pos) = decode_one(program);
        assert!(matches!(result, Err(Fault::ConstantTag { .. })), "{:?}", program);
        assert_eq!(pos, 0);
    }
}

#[test]
fn negative_references_are_rejected() {
    let (result, _) = decode_one(&[-64]);
    assert!(matches!(result, Err(Fault::ConstantTag { .. })));
    let (result, _) = decode_one(&[2, -1]);
    assert!(matches!(result, Err(Fault::ConstantTag { .. })));
}

#[test]
fn undefined_marker_is_opt_in() {
    assert_eq!(decode_one(&[50]).0, Ok(Constant::VarRef(1)));

    let tags = TagTable {
        undefined: Some(50),
        ..TagTable::default()
    };
    let mut pos = 0;
    let result = decode_constant(&[50], &mut pos, &tags, &CharMode::Identity);
    assert_eq!(result, Ok(Constant::Undefined));
}

#[test]
fn mask_multiply_transform() {
    let mut pos = 0;
    let result = decode_constant(&[2, 2, 1, 65], &mut pos, &TagTable::default(), &CharMode::MaskMultiply);
    // 1 -> 41 (')'), 65 -> 64 | (2665 & 63) = 105 ('i')
    assert_eq!(result, Ok(Constant::Str(")i".to_string())));
}

#[test]
fn string_pool_is_extracted_and_sliced() {
    // region [2, 3, 'a', 'b', 'c'] at offset 2; key = 2 ^ (8 + 4)
    let program = vec![7, 9, 2, 3, 97, 98, 99, 2 ^ 12];
    let (rest, pool) = StringPool::extract(&program, &TagTable::default(), &CharMode::Identity).unwrap();
    assert_eq!(rest, vec![7, 9, 14]);
    assert_eq!(pool.len(), 3);

    let decoder = ConstantDecoder::new(TagTable::default(), Arc::new(CharMode::Identity)).with_pool(pool);
    let mut pos = 0;
    assert_eq!(decoder.decode(&[2, 2, 1], &mut pos), Ok(Constant::Str("bc".to_string())));
    assert_eq!(pos, 3);

    let mut pos = 0;
    assert!(decoder.decode(&[2, 2, 2], &mut pos).is_err());
    assert_eq!(pos, 0);
}

#[test]
fn string_pool_offset_must_be_in_range() {
    let err = StringPool::extract(&[1, 2, 3], &TagTable::default(), &CharMode::Identity).unwrap_err();
    assert!(matches!(err, Fault::Config(_)));
    assert!(StringPool::extract(&[], &TagTable::default(), &CharMode::Identity).is_err());
}

#[test]
fn constant_display() {
    assert_eq!(Constant::SmallInt(-4).to_string(), "-4");
    assert_eq!(Constant::Float64(2.0).to_string(), "2");
    assert_eq!(Constant::Str("a\"b".to_string()).to_string(), "\"a\\\"b\"");
    assert_eq!(Constant::VarRef(12).to_string(), "v12");
    assert_eq!(Constant::VarRef(12).to_val(), None);
}
