use std::{fmt::Write, path::PathBuf};

use pegleg_gen::Options;

fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());

    let input_file = PathBuf::from(&manifest_dir).join("grammar.peg");
    println!("cargo:rerun-if-changed={}", input_file.display());
    let grammar = std::fs::read_to_string(&input_file).unwrap();

    let variants = [
        ("plain", Options::default()),
        (
            "cached",
            Options {
                cache: true,
                track_line_and_column: true,
            },
        ),
    ];

    // generated files start with inner attributes, which `include!` rejects,
    // so they are pulled in as file modules instead
    let mut modules = String::new();
    for (name, options) in variants {
        let compiled = pegleg_gen::compile(&grammar, &options).unwrap_or_else(|e| panic!("{e}"));
        let path = out_dir.join(format!("{name}.rs"));
        std::fs::write(&path, compiled.source).unwrap();
        writeln!(modules, "#[path = {:?}]", path.display().to_string()).unwrap();
        writeln!(modules, "pub mod {name};").unwrap();
    }
    std::fs::write(out_dir.join("parsers.rs"), modules).unwrap();
}
