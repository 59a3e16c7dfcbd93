// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! mimiumc — demo driver for the closure-conversion and code-emission core.
//!
//! Unlike a full language CLI, this core has no lexer or parser: its input
//! surface is hand-built MIR. Each scenario below builds a small
//! pre-conversion program (a nested `Fun` the frontend already speculated
//! as a potential closure call), runs it through `mimium_mir::closures::convert`,
//! then through `mimium_codegen::CodeGenerator`, and writes an object file.

mod output;
mod scenarios;

use std::env;
use std::process;

use colored::Colorize;
use mimium_diagnostics::ToDiagnostic;

fn print_usage() {
    println!("{} {}", output::title("mimiumc"), output::version("0.1.0"));
    println!();
    println!("{}: {} {}", output::section_header("Usage"), output::command("mimiumc"), output::arg("<scenario> [out.o]"));
    println!();
    println!("{}", output::section_header("Scenarios:"));
    println!("  {}     identity function, zero captures, Direct call", output::command("identity"));
    println!("  {}      single free-variable capture, one-field environment", output::command("capture"));
    println!("  {}       nested capture, free-variable ordering", output::command("nested"));
    println!("  {}        a `Time` value driving an `addTask` emission", output::command("timed"));
    println!("  {}   scalar arithmetic lowering", output::command("arithmetic"));
    println!("  {}         runs every scenario in turn, exercising `reset` between them", output::command("all"));
}

fn main() {
    output::init();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let out_path = args.get(2).map(String::as_str).unwrap_or("/dev/null");

    let result = match args[1].as_str() {
        "identity" => run_one("identity", scenarios::identity(), out_path),
        "capture" => run_one("capture", scenarios::capture(), out_path),
        "nested" => run_one("nested", scenarios::nested(), out_path),
        "timed" => run_one("timed", scenarios::timed(), out_path),
        "arithmetic" => run_one("arithmetic", scenarios::arithmetic(), out_path),
        "all" => run_all(),
        other => {
            eprintln!("{}: unknown scenario `{}`", output::error_label(), other);
            print_usage();
            process::exit(1);
        }
    };

    if let Err(msg) = result {
        eprintln!("{}: {}", output::error_label(), msg);
        process::exit(1);
    }
}

/// Runs one scenario end to end: convert, declare, compile, emit.
fn run_one(name: &str, scenario: scenarios::Scenario, out_path: &str) -> Result<(), String> {
    let scenarios::Scenario { mut top, mut scopes, root, mut types } = scenario;

    let known = mimium_mir::convert(&mut top, &mut scopes, root, &mut types)
        .map_err(|e| e.to_diagnostic().to_string())?;
    println!("{}", output::banner_ok(&format!("convert:{name}")));
    println!("{top}");
    println!("{} known_functions = {:?}", output::hint_label(), known);

    let mut gen = mimium_codegen::CodeGenerator::new().map_err(|e| e.to_diagnostic().to_string())?;
    gen.declare_functions(&top, &types).map_err(|e| e.to_diagnostic().to_string())?;
    gen.compile_module(&top, &types).map_err(|e| e.to_diagnostic().to_string())?;
    gen.declare_entry(mimium_codegen::TOP_LEVEL_FN).map_err(|e| e.to_diagnostic().to_string())?;

    println!("{} task_types = {:?}", output::hint_label(), gen.task_types());

    gen.emit_object(out_path).map_err(|e| e.to_diagnostic().to_string())?;
    println!("{}", output::banner_ok(&format!("emit:{name} -> {out_path}")));
    Ok(())
}

/// Scenario 6: compiles `arithmetic`, resets the generator, and recompiles
/// `timed` — verifying no name clashes survive a reset and exactly one task
/// type is recorded afterward.
fn run_all() -> Result<(), String> {
    for (name, scenario) in [
        ("identity", scenarios::identity()),
        ("capture", scenarios::capture()),
        ("nested", scenarios::nested()),
        ("timed", scenarios::timed()),
        ("arithmetic", scenarios::arithmetic()),
    ] {
        run_one(name, scenario, "/dev/null")?;
    }

    let scenarios::Scenario { mut top, mut scopes, root, mut types } = scenarios::arithmetic();
    mimium_mir::convert(&mut top, &mut scopes, root, &mut types).map_err(|e| e.to_diagnostic().to_string())?;
    let mut gen = mimium_codegen::CodeGenerator::new().map_err(|e| e.to_diagnostic().to_string())?;
    gen.declare_functions(&top, &types).map_err(|e| e.to_diagnostic().to_string())?;
    gen.compile_module(&top, &types).map_err(|e| e.to_diagnostic().to_string())?;

    gen.reset();

    let scenarios::Scenario { mut top, mut scopes, root, mut types } = scenarios::timed();
    mimium_mir::convert(&mut top, &mut scopes, root, &mut types).map_err(|e| e.to_diagnostic().to_string())?;
    gen.declare_functions(&top, &types).map_err(|e| e.to_diagnostic().to_string())?;
    gen.compile_module(&top, &types).map_err(|e| e.to_diagnostic().to_string())?;

    if gen.task_types().len() != 1 {
        return Err(format!("expected exactly one task type after reset, found {}", gen.task_types().len()));
    }
    println!("{}", output::banner_ok("reset: recompiled after reset with no name clashes"));
    Ok(())
}
