#[cfg(test)]
mod tests {
    use anyhow::Result;
    use insta::assert_snapshot;
    use paste::paste;
    use pretty_assertions::assert_eq;
    use std::{fs, path::Path};
    use wasmdis::binary::error::Error;
    use wasmdis::binary::section::SectionID;
    use wasmdis::binary::{Decoder, HeaderFormat, Module};
    use wasmdis::{disassemble, text};

    fn decode(bytes: &[u8]) -> Result<Module> {
        Decoder::new(bytes).header_format(HeaderFormat::Leb128).decode()
    }

    fn kind(err: &anyhow::Error) -> Option<&Error> {
        err.chain().find_map(|e| e.downcast_ref::<Error>())
    }

    fn print(source: &str) -> Result<String> {
        let bytes = wat::parse_str(source)?;
        disassemble(&bytes, HeaderFormat::Leb128)
    }

    /// Disassembles the fixture, assembles the output again and expects the
    /// same module back.
    fn run_test(fixture: &str) -> Result<()> {
        let path = Path::new("./tests/fixtures").join(fixture);
        let source = fs::read_to_string(path)?;

        let original = decode(&wat::parse_str(&source)?)?;
        let printed = text::print_module(&original)?;
        let reassembled = wat::parse_str(&printed)
            .map_err(|e| anyhow::anyhow!("{}\n\n{}", e, printed))?;
        let decoded = decode(&reassembled)?;

        assert_eq!(original, decoded, "printed text:\n{}", printed);
        assert_eq!(printed, text::print_module(&decoded)?);
        Ok(())
    }

    macro_rules! test {
        ($ty: ident) => {
            paste! {
                #[test]
                fn [<test_roundtrip_ $ty>]() -> Result<()> {
                    let file = format!("{}.wat", stringify!($ty));
                    run_test(&file)?;
                    Ok(())
                }
            }
        };
    }

    test!(empty);
    test!(add);
    test!(factorial);
    test!(globals);
    test!(imports);
    test!(elements);
    test!(data);
    test!(nested);
    test!(br_table);
    test!(memory);
    test!(floats);

    #[test]
    fn test_print_empty_module() -> Result<()> {
        assert_eq!(print("(module)")?, "(module)\n");
        Ok(())
    }

    #[test]
    fn test_print_function() -> Result<()> {
        let out = print(&fs::read_to_string("./tests/fixtures/add.wat")?)?;
        assert_snapshot!(out, @r###"
        (module
          (type $t0 (func (param i32) (param i32) (result i32)))
          (func $f0 (type $t0) (param $p0 i32) (param $p1 i32) (result i32)
            local.get $p0
            local.get $p1
            i32.add
          )
          (export "add" (func $f0))
        )
        "###);
        Ok(())
    }

    #[test]
    fn test_print_factorial() -> Result<()> {
        let out = print(&fs::read_to_string("./tests/fixtures/factorial.wat")?)?;
        assert_snapshot!(out, @r###"
        (module
          (type $t0 (func (param i64) (result i64)))
          (func $f0 (type $t0) (param $p0 i64) (result i64)
            (local $l1 i64)
            (local $l2 i64)
            i64.const 1
            local.set $l1
            block
              loop
                local.get $p0
                i64.eqz
                br_if 1
                local.get $l1
                local.get $p0
                i64.mul
                local.set $l1
                local.get $p0
                i64.const 1
                i64.sub
                local.set $p0
                br 0
              end
            end
            local.get $l1
          )
          (export "fac" (func $f0))
        )
        "###);
        Ok(())
    }

    #[test]
    fn test_print_imports_and_start() -> Result<()> {
        let out = print(&fs::read_to_string("./tests/fixtures/imports.wat")?)?;
        assert_snapshot!(out, @r###"
        (module
          (type $t0 (func))
          (type $t1 (func (param i32)))
          (import "env" "log" (func $f0 (type $t1)))
          (import "env" "table" (table 2 10 funcref))
          (import "env" "memory" (memory 1))
          (import "env" "g" (global $g0 (mut f32)))
          (func $f1 (type $t0)
            i32.const 7
            call $f0
          )
          (start $f1)
        )
        "###);
        Ok(())
    }

    #[test]
    fn test_print_element_segment() -> Result<()> {
        let out = print(&fs::read_to_string("./tests/fixtures/elements.wat")?)?;
        assert!(out.contains("\n  (table 5 funcref)\n"), "{}", out);
        assert!(out.contains("\n  (elem (i32.const 0) $f0 $f1 $f3 $f4)\n"), "{}", out);
        assert!(out.contains("    call_indirect (type $t0)\n"), "{}", out);
        assert!(out.contains("\n  (export \"table\" (table 0))\n"), "{}", out);
        Ok(())
    }

    #[test]
    fn test_print_folded_data() -> Result<()> {
        let out = print(r#"(module (memory (data "hi")))"#)?;
        assert_eq!(out, "(module\n  (memory (data \"hi\"))\n)\n");
        Ok(())
    }

    #[test]
    fn test_print_data_segments() -> Result<()> {
        let out = print(&fs::read_to_string("./tests/fixtures/data.wat")?)?;
        assert_snapshot!(out, @r###"
        (module
          (memory 1 2)
          (data (i32.const 16) "hello\0a\00\ff\"\\")
          (data (i32.const 64) "world")
          (export "memory" (memory 0))
        )
        "###);
        Ok(())
    }

    #[test]
    fn test_print_memory_args() -> Result<()> {
        let out = print(&fs::read_to_string("./tests/fixtures/memory.wat")?)?;
        for line in [
            "    i32.load offset=8\n",
            "    i32.store align=2\n",
            "    i64.load8_s offset=3\n",
            "    i64.store32 offset=4 align=1\n",
            "    f64.load\n",
            "    memory.size\n",
            "    memory.grow\n",
        ] {
            assert!(out.contains(line), "missing {:?} in\n{}", line, out);
        }
        Ok(())
    }

    #[test]
    fn test_print_globals() -> Result<()> {
        let out = print(&fs::read_to_string("./tests/fixtures/globals.wat")?)?;
        for line in [
            "  (import \"env\" \"base\" (global $g0 i32))\n",
            "  (global $g1 (mut i32) (global.get $g0))\n",
            "  (global $g3 i64 (i64.const -9223372036854775808))\n",
            "    global.set $g1\n",
            "  (export \"counter\" (global $g1))\n",
        ] {
            assert!(out.contains(line), "missing {:?} in\n{}", line, out);
        }
        Ok(())
    }

    #[test]
    fn test_compact_headers_match_leb128_for_small_modules() -> Result<()> {
        let bytes = wat::parse_str("(module (func (result i32) i32.const 42))")?;
        let compact = Decoder::new(&bytes).decode()?;
        assert_eq!(compact, decode(&bytes)?);
        Ok(())
    }

    #[test]
    fn test_json_dump() -> Result<()> {
        let bytes = wat::parse_str(&fs::read_to_string("./tests/fixtures/imports.wat")?)?;
        let json = serde_json::to_value(decode(&bytes)?)?;
        assert_eq!(json["version"], 1);
        assert_eq!(json["start_section"], 1);
        assert_eq!(json["import_section"].as_array().map(Vec::len), Some(4));
        Ok(())
    }

    #[test]
    fn test_reject_bad_magic() {
        let err = disassemble(b"\0wasm\x01\0\0\0", HeaderFormat::Leb128).unwrap_err();
        assert_eq!(kind(&err), Some(&Error::InvalidMagicOrVersion));
    }

    #[test]
    fn test_reject_truncated_code_section() -> Result<()> {
        let bytes = wat::parse_str("(module (func (export \"f\") (result i32) i32.const 42))")?;
        let (_, sections) = Decoder::new(&bytes).header_format(HeaderFormat::Leb128).frame()?;
        let code = sections[SectionID::Code as usize]
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no code section"))?;
        // the code section is last and its header is two bytes long
        let start = bytes.len() - 2 - code.size as usize;
        let err = decode(&bytes[..start + 1]).unwrap_err();
        assert_eq!(kind(&err), Some(&Error::MalformedVarint(start + 1)));
        for len in start + 2..bytes.len() {
            let err = decode(&bytes[..len]).unwrap_err();
            assert_eq!(
                kind(&err),
                Some(&Error::UnexpectedEof(start + 2)),
                "truncated to {}",
                len
            );
        }
        Ok(())
    }
}
