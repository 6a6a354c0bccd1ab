//! The "embed into a native executable" path: the compiled chunk is baked
//! into a generated host-language stub that replays it on the VM library.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

use crate::vm::chunk::Chunk;

/// Emit a stub for `chunk` next to `output_path` and, when a compiled VM
/// library is provided via `EMBER_VM_RLIB`, link it into an executable.
///
/// Returns the path of the artifact that was produced: the executable when
/// linking ran, otherwise the stub source.
pub fn emit_executable(chunk: &Chunk, output_path: &Path) -> Result<PathBuf> {
    let stub_path = output_path.with_extension("rs");
    write_stub(chunk, &stub_path)?;

    match std::env::var("EMBER_VM_RLIB") {
        Ok(rlib) => {
            let link_result = link_executable(&stub_path, Path::new(&rlib), output_path);
            // Clean up the intermediate stub regardless of link success
            let _ = std::fs::remove_file(&stub_path);
            link_result?;
            Ok(output_path.to_path_buf())
        }
        Err(_) => Ok(stub_path),
    }
}

/// Generate the stub source: the serialized chunk as a byte array plus a
/// `main` that loads and runs it.
pub fn write_stub(chunk: &Chunk, stub_path: &Path) -> Result<()> {
    let mut bytes = Vec::new();
    chunk
        .write_to(&mut bytes)
        .context("serialize chunk for embedding")?;

    let mut source = String::new();
    source.push_str("// Generated by the ember bytecode tool.\n");
    source.push_str("static CHUNK_BYTES: &[u8] = &[\n");
    for line in bytes.chunks(16) {
        source.push_str("    ");
        for byte in line {
            let _ = write!(source, "{byte}, ");
        }
        source.push('\n');
    }
    source.push_str("];\n\n");
    source.push_str(concat!(
        "fn main() {\n",
        "    let chunk = match ember_script::vm::chunk::Chunk::read_from(&mut &CHUNK_BYTES[..]) {\n",
        "        Ok(chunk) => chunk,\n",
        "        Err(e) => {\n",
        "            eprintln!(\"Error: {e}\");\n",
        "            std::process::exit(1);\n",
        "        }\n",
        "    };\n",
        "    let mut vm = ember_script::vm::vm::Vm::new();\n",
        "    if let Err(e) = vm.interpret(chunk) {\n",
        "        eprintln!(\"Error: {e}\");\n",
        "        std::process::exit(1);\n",
        "    }\n",
        "}\n",
    ));

    std::fs::write(stub_path, source)
        .with_context(|| format!("write stub to '{}'", stub_path.display()))
}

/// Link the stub against the precompiled VM library. `EMBER_VM_LIB_DIR`
/// optionally names the directory holding the library's dependencies.
fn link_executable(stub_path: &Path, rlib: &Path, output_path: &Path) -> Result<()> {
    let mut command = Command::new("rustc");
    command
        .arg("--edition")
        .arg("2024")
        .arg("-O")
        .arg("--extern")
        .arg(format!("ember_script={}", rlib.display()));
    if let Ok(dir) = std::env::var("EMBER_VM_LIB_DIR") {
        command.arg("-L").arg(dir);
    }
    let output = command
        .arg(stub_path)
        .arg("-o")
        .arg(output_path)
        .output()
        .context("run rustc")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("rustc failed: {stderr}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::value::Value;
    use crate::vm::chunk::OpCode;

    #[test]
    fn stub_embeds_the_serialized_chunk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stub_path = dir.path().join("app.rs");

        let mut chunk = Chunk::new();
        let idx = chunk.add_constant(Value::Number(7.0));
        chunk.write_op(OpCode::LoadConst);
        chunk.write_byte(idx as u8);
        chunk.write_op(OpCode::Print);
        chunk.write_op(OpCode::Eof);

        write_stub(&chunk, &stub_path).expect("write stub");
        let source = std::fs::read_to_string(&stub_path).expect("read stub");
        assert!(source.contains("CHUNK_BYTES"));
        assert!(source.contains("fn main()"));

        let mut bytes = Vec::new();
        chunk.write_to(&mut bytes).expect("serialize");
        // The code byte count (4 here) appears as the first array entry.
        assert!(source.contains(&format!("{}, ", bytes[0])));
    }

    #[test]
    fn emit_without_vm_rlib_leaves_the_stub() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("app");

        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Eof);

        // EMBER_VM_RLIB is not set in the test environment.
        let artifact = emit_executable(&chunk, &output).expect("emit");
        assert_eq!(artifact, dir.path().join("app.rs"));
        assert!(artifact.exists());
    }
}
