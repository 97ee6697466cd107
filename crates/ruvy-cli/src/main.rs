use std::{env, fs, process::Command, process::ExitCode};

use ruvy::{ExecutionContext, Raw, StdHost, StdPrint};

/// Ruby one-liner that compiles a source file and dumps the instruction
/// sequence as tagged JSON: symbols become plain strings, runtime strings
/// become `{"string": s}`, and hashes become `{"hash": [[k, v], ...]}`,
/// so the decoder can tell them apart again.
const DUMP_SCRIPT: &str = r#"
require "json"

def tag(node)
  case node
  when Symbol then node.to_s
  when String then { "string" => node }
  when Hash then { "hash" => node.map { |k, v| [tag(k), tag(v)] } }
  when Array then node.map { |n| tag(n) }
  else node
  end
end

iseq = RubyVM::InstructionSequence.compile_file(ARGV[0])
puts JSON.generate(tag(iseq.to_a))
"#;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    let mut dump_insns = false;
    let mut file = None;
    for arg in &args[1..] {
        match arg.as_str() {
            "--dump=insns" => dump_insns = true,
            flag if flag.starts_with('-') => {
                eprintln!("unknown option: {flag}");
                return usage();
            }
            path => file = Some(path.to_owned()),
        }
    }
    let Some(file) = file else {
        return usage();
    };

    let json = if file.ends_with(".json") {
        match fs::read_to_string(&file) {
            Ok(json) => json,
            Err(err) => {
                eprintln!("error reading {file}: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        match compile_with_host(&file) {
            Ok(json) => json,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        }
    };

    let raw = match Raw::from_json_str(&json) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let iseq = match ruvy::decode(&raw) {
        Ok(iseq) => iseq,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if dump_insns {
        print!("{}", ruvy::disasm(&iseq));
        return ExitCode::SUCCESS;
    }

    let mut host = StdHost::new();
    let mut writer = StdPrint;
    let mut ctx = ExecutionContext::new(&mut host, &mut writer);
    match ctx.eval(&iseq) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn usage() -> ExitCode {
    eprintln!("usage: ruvy [--dump=insns] <file.rb | file.json>");
    ExitCode::FAILURE
}

/// Shells out to the host `ruby` to compile a source file into the tagged
/// JSON dump format.
fn compile_with_host(path: &str) -> Result<String, String> {
    let output = Command::new("ruby")
        .arg("-e")
        .arg(DUMP_SCRIPT)
        .arg(path)
        .output()
        .map_err(|err| format!("failed to launch the host compiler (ruby): {err}"))?;
    if !output.status.success() {
        return Err(format!(
            "host compiler failed:\n{}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    String::from_utf8(output.stdout).map_err(|err| format!("host compiler produced invalid UTF-8: {err}"))
}
