//! Meta-command dispatch and the line-at-a-time driver.
//!
//! The read loop itself lives in the binary; this module owns everything
//! between a trimmed input line and the bytes written back: `\`-command
//! handling, fault printing, script loading, and the `\t` benchmark with
//! its startup calibration.

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use itertools::Itertools;
use strum::IntoEnumIterator;
use tacit_asm::Verb;

use crate::error::VmError;
use crate::interpreter::Interpreter;

/// Iterations of the startup calibration loop.
const CALIBRATION_ROUNDS: u32 = 200_000;

/// What the driver should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep reading.
    Continue,
    /// Clean quit (`\q` or end of input).
    Quit,
    /// Unrecoverable fault; the process should exit non-zero.
    Fatal,
}

/// One interpreter plus the meta-command surface around it.
pub struct Repl {
    vm: Interpreter,
    nop_ns: u64,
}

impl Repl {
    /// Build an interpreter and calibrate the benchmark clock once.
    pub fn new(workers: usize) -> Repl {
        Repl {
            vm: Interpreter::new(workers),
            nop_ns: calibrate(),
        }
    }

    /// The interpreter, for embedding and tests.
    pub fn vm_mut(&mut self) -> &mut Interpreter {
        &mut self.vm
    }

    /// Process one input line (trailing newline already trimmed).
    pub fn line(&mut self, src: &str, out: &mut dyn Write) -> std::io::Result<Outcome> {
        let src = src.trim_end_matches(['\n', '\r']);
        if let Some(meta) = src.strip_prefix('\\') {
            return self.meta(meta, out);
        }
        match self.vm.line(src) {
            Ok(Some(text)) => writeln!(out, "{text}")?,
            Ok(None) => {}
            Err(error) => return self.report(error, out),
        }
        Ok(Outcome::Continue)
    }

    /// Execute a script file line by line, as if typed.
    pub fn load(&mut self, path: &Path, out: &mut dyn Write) -> std::io::Result<Outcome> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) => {
                writeln!(out, "io error: {}: {error}", path.display())?;
                return Ok(Outcome::Continue);
            }
        };
        for line in text.lines() {
            match self.line(line, out)? {
                Outcome::Continue => {}
                stop => return Ok(stop),
            }
        }
        Ok(Outcome::Continue)
    }

    fn meta(&mut self, meta: &str, out: &mut dyn Write) -> std::io::Result<Outcome> {
        let (command, rest) = match meta.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (meta, ""),
        };
        match command {
            "q" => return Ok(Outcome::Quit),
            "w" => writeln!(out, "{}", self.vm.heap_bytes())?,
            "v" => {
                let letters = self.vm.bound_letters();
                writeln!(out, "{}", letters.iter().join(" "))?;
            }
            "?" => self.help(out)?,
            "l" => {
                if rest.is_empty() {
                    writeln!(out, "\\l FILE")?;
                } else {
                    return self.load(Path::new(rest), out);
                }
            }
            "t" => return self.time(rest, out),
            _ => writeln!(out, "\\{command} ?")?,
        }
        Ok(Outcome::Continue)
    }

    /// `\t [N] EXPR`: N evaluations of EXPR, printing nanoseconds per
    /// iteration net of the calibrated loop overhead.
    fn time(&mut self, rest: &str, out: &mut dyn Write) -> std::io::Result<Outcome> {
        let (iterations, expr) = match rest.split_once(char::is_whitespace) {
            Some((head, tail)) => match head.parse::<u32>() {
                Ok(n) if n > 0 => (n, tail.trim()),
                _ => (1, rest),
            },
            None => (1, rest),
        };
        if expr.is_empty() {
            writeln!(out, "\\t [N] EXPR")?;
            return Ok(Outcome::Continue);
        }
        if let Err(error) = self.vm.prepare(expr) {
            return self.report(error, out);
        }
        let start = Instant::now();
        for _ in 0..iterations {
            if let Err(error) = self.vm.run_prepared() {
                return self.report(error, out);
            }
        }
        let per_iter = (start.elapsed().as_nanos() / u128::from(iterations)) as u64;
        writeln!(out, "{}", per_iter.saturating_sub(self.nop_ns))?;
        Ok(Outcome::Continue)
    }

    fn help(&self, out: &mut dyn Write) -> std::io::Result<()> {
        for verb in Verb::iter() {
            let monadic = verb.monadic_name().unwrap_or("");
            let dyadic = verb.dyadic_name().unwrap_or("");
            writeln!(out, "{:3} {monadic:12} {dyadic}", verb.to_string())?;
        }
        writeln!(out, "\\q quit  \\l FILE load  \\t [N] E time  \\w bytes  \\v vars")
    }

    /// Print a fault and decide whether the process survives it.
    fn report(&mut self, error: VmError, out: &mut dyn Write) -> std::io::Result<Outcome> {
        writeln!(out, "{error}")?;
        if error.is_fatal() {
            tracing::warn!(%error, "fatal fault");
            return Ok(Outcome::Fatal);
        }
        Ok(Outcome::Continue)
    }
}

/// Measure the per-iteration cost of an empty timing loop.
fn calibrate() -> u64 {
    let start = Instant::now();
    for _ in 0..CALIBRATION_ROUNDS {
        std::hint::black_box(());
    }
    (start.elapsed().as_nanos() / u128::from(CALIBRATION_ROUNDS)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(repl: &mut Repl, src: &str) -> (Outcome, String) {
        let mut out = Vec::new();
        let outcome = repl.line(src, &mut out).expect("write to vec");
        (outcome, String::from_utf8(out).expect("utf8 output"))
    }

    #[test]
    fn quit_and_continue() {
        let mut repl = Repl::new(1);
        assert_eq!(run(&mut repl, "\\q").0, Outcome::Quit);
        assert_eq!(run(&mut repl, "1+1").0, Outcome::Continue);
    }

    #[test]
    fn timing_prints_one_integer() {
        let mut repl = Repl::new(1);
        let (outcome, text) = run(&mut repl, "\\t 10 +/!100");
        assert_eq!(outcome, Outcome::Continue);
        let printed = text.trim();
        assert!(printed.parse::<u64>().is_ok(), "got {printed:?}");
    }

    #[test]
    fn workspace_report_is_a_byte_count() {
        let mut repl = Repl::new(1);
        run(&mut repl, "x:!1000");
        let (_, text) = run(&mut repl, "\\w");
        assert!(text.trim().parse::<u64>().expect("byte count") >= 4000);
    }

    #[test]
    fn variable_listing_names_bound_letters() {
        let mut repl = Repl::new(1);
        run(&mut repl, "x:1; z:2");
        let (_, text) = run(&mut repl, "\\v");
        assert_eq!(text.trim(), "x z");
    }

    #[test]
    fn faults_print_their_token() {
        let mut repl = Repl::new(1);
        let (outcome, text) = run(&mut repl, "1%0");
        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(text.trim_end(), "% dom");
    }

    #[test]
    fn help_lists_every_glyph() {
        let mut repl = Repl::new(1);
        let (_, text) = run(&mut repl, "\\?");
        for verb in Verb::iter() {
            assert!(text.contains(verb.glyph()), "missing {verb:?}");
        }
    }
}
