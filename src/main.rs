//! Bailout CLI
//!
//! Disassembles translation byte streams and runs traced inline cache and
//! deoptimization scenarios.

use std::path::PathBuf;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use bailout::deopt::frame::STACK_BASE;
use bailout::deopt::translation::parse_hex;
use bailout::deopt::{decode_commands, FixedSlot, Opcode, Stack};
use bailout::prelude::*;

#[derive(Parser)]
#[command(name = "bailout")]
#[command(author, version, about = "Inline caches and deoptimization, one scenario at a time", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (JSON)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a translation byte stream given in hex
    Disasm {
        /// Bytes of the translation, e.g. "0102..." or "01 02 ..."
        hex: String,
    },

    /// Run a traced scenario
    Demo {
        #[arg(value_enum)]
        scenario: Scenario,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Scenario {
    /// A named load site going monomorphic, then megamorphic
    Ic,
    /// A keyed store widening the elements kind of an array
    Keyed,
    /// An eager bailout of an optimized frame
    Deopt,
    /// On-stack replacement, once accepted and once aborted
    Osr,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading configuration from '{}'", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate()?;

    match cli.command {
        Commands::Disasm { hex } => disassemble(&hex),
        Commands::Demo { scenario } => {
            let config = config.with_trace_ic(true).with_trace_deopt(true).with_trace_osr(true);
            let mut isolate = Isolate::with_config(config);
            match scenario {
                Scenario::Ic => demo_ic(&mut isolate),
                Scenario::Keyed => demo_keyed(&mut isolate),
                Scenario::Deopt => demo_deopt(&mut isolate),
                Scenario::Osr => demo_osr(&mut isolate),
            }
        }
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn disassemble(hex: &str) -> anyhow::Result<()> {
    let bytes = parse_hex(hex)?;
    let commands = decode_commands(&bytes)?;
    let mut depth = 0;
    for command in &commands {
        let opcode = command.opcode();
        if opcode == Opcode::Begin {
            depth = 0;
        } else if opcode.is_frame_kind() {
            depth = 1;
        }
        let indent = if opcode.is_frame_kind() || opcode == Opcode::Begin { 0 } else { depth + 1 };
        println!("{:width$}{}", "", command, width = indent * 2);
    }
    Ok(())
}

// ==================== Scenarios ====================

fn demo_ic(isolate: &mut Isolate) -> anyhow::Result<()> {
    let x = isolate.heap_mut().intern("x");
    let y = isolate.heap_mut().intern("y");
    let first = isolate.heap_mut().new_object();
    isolate
        .heap_mut()
        .add_property(first, x, Value::Smi(1), PropertyAttributes::empty());
    let second = isolate.heap_mut().new_object();
    isolate
        .heap_mut()
        .add_property(second, y, Value::Smi(0), PropertyAttributes::empty());
    isolate
        .heap_mut()
        .add_property(second, x, Value::Smi(2), PropertyAttributes::empty());

    let mut site = isolate.new_site(IcKind::Load, ExtraIcState::default());
    println!("load site: {}", site.state());
    for receiver in [first, first, second, first] {
        let value = isolate.load(&mut site, Value::Object(receiver), x)?;
        println!("  o.x = {:<4} site: {}", value, site.state());
    }
    let stats = isolate.stub_cache().stats();
    println!("stub cache: {} entries, {} hits, {} misses", isolate.stub_cache().len(), stats.hits, stats.misses);
    Ok(())
}

fn demo_keyed(isolate: &mut Isolate) -> anyhow::Result<()> {
    let array = isolate
        .heap_mut()
        .new_array(vec![Value::Smi(1), Value::Smi(2), Value::Smi(3)]);
    let array = Value::Object(array);
    let mut site = isolate.new_site(IcKind::KeyedStore, ExtraIcState::default());
    let half = isolate.heap_mut().new_number(1.5);
    let text = isolate.heap_mut().new_string("three");
    let stores = [(0, Value::Smi(7)), (1, Value::Smi(8)), (1, half), (2, text), (5, Value::Smi(9))];
    println!("array: {}", describe_elements(isolate, array));
    for (index, value) in stores {
        isolate.keyed_store(&mut site, array, Value::Smi(index), value)?;
        println!(
            "  a[{}] = {:<10} site: {:<12} {}",
            index,
            isolate.heap().describe(value),
            site.state().to_string(),
            describe_elements(isolate, array)
        );
    }
    Ok(())
}

fn describe_elements(isolate: &Isolate, array: Value) -> String {
    match isolate.heap().elements_kind_of(array) {
        Some(kind) => format!("elements {:?}", kind),
        None => "no elements".to_string(),
    }
}

fn demo_deopt(isolate: &mut Isolate) -> anyhow::Result<()> {
    let (function, shared) = baseline_function(isolate, "add", 1, &[(BailoutId(3), 20)]);

    let mut buffer = TranslationBuffer::new();
    let mut translation = Translation::new(&mut buffer, 1, 1);
    let index = translation.index();
    translation.begin_js_frame(BailoutId(3), 0, 2);
    translation.store_stack_slot(-2);
    translation.store_stack_slot(-1);
    translation.store_stack_slot(0);
    translation.store_double_register(1);
    let data = DeoptimizationInputData {
        translations: buffer.into_bytes(),
        entries: vec![DeoptEntry {
            ast_id: BailoutId(3),
            translation_index: index,
            arguments_stack_height: 0,
            pc: 12,
        }],
        literals: vec![function],
        osr_ast_id: None,
    };
    let code = isolate.add_code(Code::optimized(shared, 48, 1, data));
    install(isolate, function, code)?;

    let mut frame = FrameDescription::for_function(FrameType::Optimized, function, 1, 1);
    write_fixed_part(&mut frame, function);
    let size = frame.size();
    frame.set_tagged(size - 1, Value::Undefined);
    frame.set_tagged(size - 2, Value::Smi(1));
    let spill = frame.offset_from_slot_index(0);
    frame.set_tagged(spill, Value::Smi(41));
    frame.registers_mut().set_double_register(1, 0.5);
    frame.set_pc(isolate.code_space().get(code).address(12));
    isolate.stack_mut().push(frame);

    let resumption = isolate.deoptimize(BailoutRequest::eager(function, 0))?;
    println!("resuming {} frame(s) at pc {:#x} ({})", resumption.frames.len(), resumption.pc(), resumption.state());
    print_stack(isolate, isolate.stack());
    Ok(())
}

fn demo_osr(isolate: &mut Isolate) -> anyhow::Result<()> {
    let (function, shared) = baseline_function(isolate, "loop", 1, &[(BailoutId(5), 30)]);

    let mut buffer = TranslationBuffer::new();
    let mut translation = Translation::new(&mut buffer, 1, 1);
    let index = translation.index();
    translation.begin_js_frame(BailoutId(5), 0, 2);
    translation.store_stack_slot(-2);
    translation.store_stack_slot(-1);
    translation.store_int32_stack_slot(0);
    translation.store_double_register(0);
    let data = DeoptimizationInputData {
        translations: buffer.into_bytes(),
        entries: vec![DeoptEntry {
            ast_id: BailoutId(5),
            translation_index: index,
            arguments_stack_height: 0,
            pc: 8,
        }],
        literals: vec![function],
        osr_ast_id: Some(BailoutId(5)),
    };
    let code = isolate.add_code(Code::optimized(shared, 32, 1, data));
    install(isolate, function, code)?;

    let counters = [Value::Smi(3), isolate.heap_mut().new_number(2.5)];
    for counter in counters {
        let sum = isolate.heap_mut().new_number(1.25);
        let mut frame = FrameDescription::for_function(FrameType::JavaScript, function, 1, 2);
        write_fixed_part(&mut frame, function);
        let size = frame.size();
        frame.set_tagged(size - 1, Value::Undefined);
        frame.set_tagged(size - 2, Value::Smi(10));
        frame.set_expression(0, Word::Tagged(counter));
        frame.set_expression(1, Word::Tagged(sum));
        isolate.stack_mut().push(frame);

        println!("entering optimized code with counter {}", isolate.heap().describe(counter));
        match isolate.on_stack_replace(function) {
            Ok(resumption) => {
                println!("  replaced, resuming at pc {:#x}", resumption.pc());
                print_stack(isolate, isolate.stack());
            }
            Err(Error::Osr(abort)) => println!("  stayed interpreted: {}", abort),
            Err(other) => return Err(other.into()),
        }
        isolate.stack_mut().pop();
    }
    Ok(())
}

// ==================== Helpers ====================

/// A function with baseline code resuming at the given (node, pc offset) points
fn baseline_function(
    isolate: &mut Isolate,
    name: &str,
    formal_parameter_count: usize,
    points: &[(BailoutId, usize)],
) -> (Value, SharedId) {
    let shared = isolate
        .heap_mut()
        .new_shared_function_info(name, formal_parameter_count, None);
    let mut output = DeoptimizationOutputData::new();
    for (id, pc_offset) in points {
        output.add(*id, *pc_offset, FullCodeState::NoRegisters);
    }
    let code = isolate.add_code(Code::unoptimized(shared, 64, output));
    isolate.heap_mut().shared_mut(shared).code = Some(code);
    let function = isolate.heap_mut().new_function(shared);
    (Value::Object(function), shared)
}

fn install(isolate: &mut Isolate, function: Value, code: CodeId) -> anyhow::Result<()> {
    let Some(id) = function.as_object() else {
        bail!("{} is not a function", function);
    };
    if !isolate.install_optimized_code(id, code) {
        bail!("optimization of {} is disabled", function);
    }
    Ok(())
}

fn write_fixed_part(frame: &mut FrameDescription, function: Value) {
    frame.set_slot(frame.fixed_slot_offset(FixedSlot::CallerPc), Word::Int(0));
    frame.set_slot(frame.fixed_slot_offset(FixedSlot::CallerFp), Word::Int(STACK_BASE as i64));
    frame.set_tagged(frame.fixed_slot_offset(FixedSlot::Context), Value::Undefined);
    frame.set_tagged(frame.fixed_slot_offset(FixedSlot::Function), function);
}

fn print_stack(isolate: &Isolate, stack: &Stack) {
    for (i, frame) in stack.iter().enumerate() {
        println!(
            "  #{} {} frame {:#x}..{:#x} pc={:#x}",
            i,
            frame.frame_type(),
            frame.top(),
            frame.top() + frame.size(),
            frame.pc()
        );
        for (offset, word) in frame.words().iter().enumerate().rev() {
            let shown = match word {
                Word::Tagged(value) => isolate.heap().describe(*value),
                other => other.to_string(),
            };
            println!("      [top + {:>2}] {}", offset, shown);
        }
    }
}
