use ember_script::interpreter::value::Value;
use ember_script::vm::chunk::{Chunk, ChunkIoError, OpCode};
use ember_script::vm::compile_to_chunk;

fn to_bytes(chunk: &Chunk) -> Vec<u8> {
    let mut bytes = Vec::new();
    chunk.write_to(&mut bytes).expect("serialize should succeed");
    bytes
}

#[test]
fn compiled_programs_round_trip_byte_for_byte() {
    let sources = [
        "var x = 2; var y = 3; print(x + y * 4);",
        "var n = \"world\"; print(\"Hello, \" + n + \"!\");",
        "var flag = true; var nothing = null; print(flag);",
        "var s = 0; var i = 1; while (i <= 5) { s = s + i; i = i + 1; } print(s);",
    ];
    for source in sources {
        let chunk = compile_to_chunk(source).expect("compile should succeed");
        let bytes = to_bytes(&chunk);
        let loaded = Chunk::read_from(&mut bytes.as_slice()).expect("deserialize");
        assert_eq!(to_bytes(&loaded), bytes, "round trip differs for: {source}");
    }
}

#[test]
fn layout_starts_with_little_endian_counts() {
    let chunk = compile_to_chunk("print(1);").expect("compile");
    let bytes = to_bytes(&chunk);
    let code_count = u32::from_le_bytes(bytes[0..4].try_into().expect("4 bytes"));
    let constants_count = u32::from_le_bytes(bytes[4..8].try_into().expect("4 bytes"));
    assert_eq!(code_count as usize, chunk.code.len());
    assert_eq!(constants_count as usize, chunk.constants.len());
    assert_eq!(&bytes[8..8 + chunk.code.len()], chunk.code.as_slice());
}

#[test]
fn string_constants_have_no_terminator() {
    let mut chunk = Chunk::new();
    chunk.add_constant(Value::Str("ab".to_string()));
    let bytes = to_bytes(&chunk);
    // u32 code count + u32 constant count + tag + u32 length + "ab"
    assert_eq!(bytes.len(), 4 + 4 + 1 + 4 + 2);
    assert_eq!(&bytes[bytes.len() - 2..], b"ab");
}

#[test]
fn chunk_files_survive_a_disk_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("out.embc");

    let chunk = compile_to_chunk("var greeting = \"hi\"; print(greeting);").expect("compile");
    let mut file = std::fs::File::create(&path).expect("create");
    chunk.write_to(&mut file).expect("write");
    drop(file);

    let bytes = std::fs::read(&path).expect("read");
    let loaded = Chunk::read_from(&mut bytes.as_slice()).expect("deserialize");
    assert_eq!(to_bytes(&loaded), to_bytes(&chunk));

    let mut vm = ember_script::vm::vm::Vm::new();
    vm.interpret(loaded).expect("run loaded chunk");
    assert_eq!(vm.output(), &["hi"]);
}

#[test]
fn writer_rejects_non_serializable_constants() {
    let mut chunk = Chunk::new();
    chunk.add_constant(Value::Array(vec![Value::Number(1.0)]));
    chunk.write_op(OpCode::Eof);
    let mut bytes = Vec::new();
    assert!(matches!(
        chunk.write_to(&mut bytes).unwrap_err(),
        ChunkIoError::UnsupportedConstant("array")
    ));
}

#[test]
fn reader_rejects_garbage() {
    let err = Chunk::read_from(&mut [0u8, 1, 2].as_slice()).unwrap_err();
    assert!(matches!(err, ChunkIoError::Truncated));
}
