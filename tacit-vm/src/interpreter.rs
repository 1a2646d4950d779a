//! [`Interpreter`] implementation.
//!
//! The interpreter is the single context object owning the heap, the 27
//! scopes, the worker configuration and the PRNG. Evaluation is one
//! right-to-left scan per byte-stream with a single accumulator, recursing
//! at group bytes and at user-scope application.

use tacit_asm::{Code, Fault, Verb};
use tacit_types::{Tag, Value};

use crate::consts::{SCOPE_COUNT, STREAM_BYTES, TOP_SCOPE};
use crate::dispatch::Ctx;
use crate::error::{FaultResult, VmError, WithGlyph};
use crate::heap::Heap;
use crate::kernels::rand::XorShift;
use crate::parser::{self, NumLit, Token};
use crate::printer;
use crate::scope::{scope_index, scope_letter, Scope};
use crate::workers::Workers;

/// The interpreter context: all process-wide state behind one object.
pub struct Interpreter {
    pub(crate) heap: Heap,
    scopes: Vec<Scope>,
    workers: Workers,
    rng: XorShift,
}

impl Interpreter {
    /// Fresh interpreter with `workers` kernel lanes.
    pub fn new(workers: usize) -> Interpreter {
        Interpreter {
            heap: Heap::new(),
            scopes: (0..SCOPE_COUNT).map(|_| Scope::new()).collect(),
            workers: Workers::new(workers),
            rng: XorShift::new(),
        }
    }

    /// Compile and evaluate one source line; the returned text is what the
    /// read loop prints. `None` means every segment was silent.
    pub fn line(&mut self, src: &str) -> Result<Option<String>, VmError> {
        let tokens = parser::lex(src).glyph(' ')?;
        let mut outputs = Vec::new();
        for segment in parser::segments(tokens) {
            if segment.is_empty() {
                continue;
            }
            if let Some((letter, body)) = define_form(&segment)? {
                let target = scope_index(letter);
                if self.scopes[target].active {
                    return Err(VmError::Fault {
                        glyph: ':',
                        fault: Fault::InUse,
                    });
                }
                parser::compile(self, target, body).glyph(':')?;
                continue;
            }
            let silent = parser::compile(self, TOP_SCOPE, &segment).glyph(' ')?;
            if let Some(value) = self.exec_scope(TOP_SCOPE)? {
                if !silent {
                    outputs.push(printer::render(self, value));
                }
                self.heap.release(value);
            }
        }
        Ok(if outputs.is_empty() {
            None
        } else {
            Some(outputs.join("\n"))
        })
    }

    /// Compile one expression into the top scope without evaluating, for
    /// the timing command.
    pub fn prepare(&mut self, src: &str) -> Result<(), VmError> {
        let tokens = parser::lex(src).glyph(' ')?;
        let mut segments = parser::segments(tokens).into_iter();
        let segment = segments.next().filter(|s| !s.is_empty()).ok_or(VmError::Fault {
            glyph: ' ',
            fault: Fault::Parse,
        })?;
        parser::compile(self, TOP_SCOPE, &segment).glyph(' ')?;
        Ok(())
    }

    /// Evaluate the last prepared expression, discarding the result.
    pub fn run_prepared(&mut self) -> Result<(), VmError> {
        if let Some(value) = self.exec_scope(TOP_SCOPE)? {
            self.heap.release(value);
        }
        Ok(())
    }

    /// Release every binding in every scope. Afterwards every handle is
    /// free and every pool block is back on its list.
    pub fn reset(&mut self) {
        for scope in self.scopes.iter_mut() {
            for value in scope.drain_slots() {
                self.heap.release(value);
            }
        }
        // Scope teardown cannot leave live handles behind.
        debug_assert_eq!(self.heap.live_handles(), 0);
    }

    /// Live handle count, for the workspace report and tests.
    pub fn live_handles(&self) -> usize {
        self.heap.live_handles()
    }

    /// Bytes of heap backing live arrays.
    pub fn heap_bytes(&self) -> usize {
        self.heap.used_bytes()
    }

    /// Letters bound to a value in the top-level scope.
    pub fn bound_letters(&self) -> Vec<char> {
        self.scopes[TOP_SCOPE]
            .bound_letters()
            .into_iter()
            .map(char::from)
            .collect()
    }

    pub(crate) fn ctx(&mut self) -> Ctx<'_> {
        Ctx {
            heap: &mut self.heap,
            workers: &self.workers,
            rng: &mut self.rng,
        }
    }

    pub(crate) fn scope_mut(&mut self, s: usize) -> &mut Scope {
        &mut self.scopes[s]
    }

    // ---- literal materialisation (compiler support) ----

    pub(crate) fn clear_scope_literals(&mut self, s: usize) {
        for slot in self.scopes[s].literal_slots() {
            if let Some(value) = self.scopes[s].swap(slot, None) {
                self.heap.release(value);
            }
        }
        self.scopes[s].clear_literals();
    }

    pub(crate) fn bind_literal(&mut self, s: usize, value: Value) -> FaultResult<u8> {
        match self.scopes[s].claim_literal() {
            Some(slot) => {
                self.scopes[s].swap(slot, Some(value));
                Ok(slot as u8)
            }
            None => {
                self.heap.release(value);
                Err(Fault::Parse)
            }
        }
    }

    /// Build the value of a literal token.
    pub(crate) fn literal_value(&mut self, token: &Token) -> FaultResult<Value> {
        match token {
            Token::Nums(strand) => match strand.as_slice() {
                [NumLit::Int(i)] => Ok(Value::int(*i)),
                [NumLit::Float(f)] => Ok(Value::float(*f)),
                strand => {
                    if strand.iter().any(|lit| matches!(lit, NumLit::Float(_))) {
                        let out = self.heap.alloc(Tag::Float, strand.len())?;
                        for (slot, lit) in self.heap.f32s_mut(out).iter_mut().zip(strand) {
                            *slot = match *lit {
                                NumLit::Int(i) => i as f32,
                                NumLit::Float(f) => f,
                            };
                        }
                        Ok(out)
                    } else {
                        let out = self.heap.alloc(Tag::Int, strand.len())?;
                        for (slot, lit) in self.heap.i32s_mut(out).iter_mut().zip(strand) {
                            *slot = match *lit {
                                NumLit::Int(i) => i,
                                NumLit::Float(_) => unreachable!("screened above"),
                            };
                        }
                        Ok(out)
                    }
                }
            },
            Token::Str(text) => {
                let out = self.heap.alloc(Tag::Byte, text.len())?;
                self.heap.u8s_mut(out).copy_from_slice(text);
                Ok(out)
            }
            Token::Syms(strand) => match strand.as_slice() {
                [sym] => Ok(Value::sym(*sym)),
                strand => {
                    let out = self.heap.alloc(Tag::Sym, strand.len())?;
                    for (slot, sym) in self.heap.u32s_mut(out).iter_mut().zip(strand) {
                        *slot = sym.bits();
                    }
                    Ok(out)
                }
            },
            _ => unreachable!("only literal tokens are materialised"),
        }
    }

    // ---- evaluation ----

    /// Execute a scope's compiled body.
    pub(crate) fn exec_scope(&mut self, s: usize) -> Result<Option<Value>, VmError> {
        let mut buf = [0u8; STREAM_BYTES];
        let stream = self.scopes[s].stream();
        let len = stream.len();
        buf[..len].copy_from_slice(stream);
        self.scopes[s].active = true;
        let mut pos = len;
        let result = self.eval_range(s, &buf[..len], &mut pos);
        self.scopes[s].active = false;
        match result {
            Ok(acc) if pos == 0 => Ok(acc),
            Ok(acc) => {
                self.drop_acc(acc);
                Err(Fault::Parse.into())
            }
            Err(error) => Err(error),
        }
    }

    /// Evaluate bytes right-to-left until the range start or an unmatched
    /// group-open byte. The accumulator holds the value to the right.
    fn eval_range(
        &mut self,
        s: usize,
        bytes: &[u8],
        pos: &mut usize,
    ) -> Result<Option<Value>, VmError> {
        let mut acc: Option<Value> = None;
        loop {
            if *pos == 0 {
                return Ok(acc);
            }
            let Some(code) = Code::decode(bytes[*pos - 1]) else {
                self.drop_acc(acc);
                return Err(Fault::Parse.into());
            };
            if code == Code::Open {
                // The caller owns the matching byte.
                return Ok(acc);
            }
            *pos -= 1;
            match code {
                Code::Slot(slot) => {
                    acc = Some(self.load_slot(s, bytes, pos, slot as usize, acc.take())?);
                }
                Code::Verb(verb) => {
                    let Some(right) = acc.take() else {
                        return Err(VmError::Fault {
                            glyph: verb.glyph(),
                            fault: Fault::Parse,
                        });
                    };
                    let result = if verb.dyadic() && self.has_left(s, bytes, *pos) {
                        let left = match self.take_operand(s, bytes, pos) {
                            Ok(value) => value,
                            Err(error) => {
                                self.heap.release(right);
                                return Err(error);
                            }
                        };
                        let result = self.ctx().dyad(verb, left, right);
                        self.heap.release(left);
                        self.heap.release(right);
                        result
                    } else {
                        let result = self.ctx().monad(verb, right);
                        self.heap.release(right);
                        result
                    };
                    match result {
                        Ok(value) => acc = Some(value),
                        Err(fault) => {
                            return Err(VmError::Fault {
                                glyph: verb.glyph(),
                                fault,
                            })
                        }
                    }
                }
                Code::Assign => {
                    let Some(value) = acc else {
                        return Err(Fault::Parse.into());
                    };
                    let target = match *pos {
                        0 => None,
                        p => match Code::decode(bytes[p - 1]) {
                            Some(Code::Slot(slot)) => Some(slot as usize),
                            _ => None,
                        },
                    };
                    let Some(target) = target else {
                        self.drop_acc(acc);
                        return Err(Fault::Parse.into());
                    };
                    *pos -= 1;
                    if let Err(fault) = self.heap.retain(value) {
                        self.drop_acc(acc);
                        return Err(fault.into());
                    }
                    self.store(s, target, value);
                    // The accumulator survives the assignment for chains.
                }
                Code::Close => {
                    let value = match self.group(s, bytes, pos) {
                        Ok(value) => value,
                        Err(error) => {
                            self.drop_acc(acc);
                            return Err(error);
                        }
                    };
                    acc = Some(self.apply_value(value, acc.take())?);
                }
                Code::Open => unreachable!("handled before the position moves"),
            }
        }
    }

    /// A slot byte: user-scope application when the letter names a scope
    /// with a compiled body, otherwise a variable or literal load.
    fn load_slot(
        &mut self,
        s: usize,
        bytes: &[u8],
        pos: &mut usize,
        slot: usize,
        acc: Option<Value>,
    ) -> Result<Value, VmError> {
        if let Some(letter) = self.scopes[s].letter_of(slot) {
            let callee = scope_index(letter);
            if self.scopes[callee].has_body() {
                let Some(right) = acc else {
                    return Err(VmError::Fault {
                        glyph: letter as char,
                        fault: Fault::NotYetImplemented,
                    });
                };
                let left = if self.has_left(s, bytes, *pos) {
                    match self.take_operand(s, bytes, pos) {
                        Ok(value) => Some(value),
                        Err(error) => {
                            self.heap.release(right);
                            return Err(error);
                        }
                    }
                } else {
                    None
                };
                return self.call(callee, left, right);
            }
        }
        let Some(value) = self.scopes[s].get(slot) else {
            self.drop_acc(acc);
            return Err(Fault::Parse.into());
        };
        let value = match self.heap.retain(value) {
            Ok(value) => value,
            Err(fault) => {
                self.drop_acc(acc);
                return Err(fault.into());
            }
        };
        self.apply_value(value, acc)
    }

    /// Juxtaposition: with no pending right operand the value passes
    /// through; an array applied to an operand indexes into it.
    fn apply_value(&mut self, value: Value, acc: Option<Value>) -> Result<Value, VmError> {
        let Some(right) = acc else {
            return Ok(value);
        };
        if value.is_boxed() {
            let result = self.ctx().dyad(Verb::At, value, right);
            self.heap.release(value);
            self.heap.release(right);
            result.glyph('@')
        } else {
            self.heap.release(value);
            self.heap.release(right);
            Err(VmError::Fault {
                glyph: ' ',
                fault: Fault::Rank,
            })
        }
    }

    /// Apply a user scope: bind arguments into its `x`/`y` slots, execute
    /// its body, restore on return. Re-entry is rejected.
    fn call(&mut self, callee: usize, left: Option<Value>, right: Value) -> Result<Value, VmError> {
        if self.scopes[callee].active {
            if let Some(value) = left {
                self.heap.release(value);
            }
            self.heap.release(right);
            return Err(VmError::Fault {
                glyph: scope_letter(callee) as char,
                fault: Fault::InUse,
            });
        }
        match left {
            Some(value) => {
                if let Err(error) = self.bind_arg(callee, b'x', value) {
                    self.heap.release(right);
                    return Err(error);
                }
                self.bind_arg(callee, b'y', right)?;
            }
            None => self.bind_arg(callee, b'x', right)?,
        }
        self.exec_scope(callee)?.ok_or(VmError::Fault {
            glyph: scope_letter(callee) as char,
            fault: Fault::Parse,
        })
    }

    fn bind_arg(&mut self, callee: usize, letter: u8, value: Value) -> Result<(), VmError> {
        match self.scopes[callee].slot_for(letter) {
            Some(slot) => {
                self.store(callee, slot, value);
                Ok(())
            }
            None => {
                self.heap.release(value);
                Err(Fault::Parse.into())
            }
        }
    }

    /// Left operand of a dyadic position: the slot or group immediately
    /// to the left.
    fn take_operand(&mut self, s: usize, bytes: &[u8], pos: &mut usize) -> Result<Value, VmError> {
        match Code::decode(bytes[*pos - 1]) {
            Some(Code::Slot(slot)) => {
                *pos -= 1;
                let value = self.scopes[s]
                    .get(slot as usize)
                    .ok_or(VmError::from(Fault::Parse))?;
                self.heap.retain(value).glyph(' ')
            }
            Some(Code::Close) => {
                *pos -= 1;
                self.group(s, bytes, pos)
            }
            _ => unreachable!("callers check has_left first"),
        }
    }

    /// Evaluate a parenthesised group; the close byte is already consumed.
    fn group(&mut self, s: usize, bytes: &[u8], pos: &mut usize) -> Result<Value, VmError> {
        let inner = self.eval_range(s, bytes, pos)?;
        if *pos == 0 || Code::decode(bytes[*pos - 1]) != Some(Code::Open) {
            self.drop_acc(inner);
            return Err(Fault::Parse.into());
        }
        *pos -= 1;
        inner.ok_or(VmError::from(Fault::Parse))
    }

    /// Bind a value into a slot, releasing the previous binding. The slot
    /// takes ownership of the given reference.
    pub(crate) fn store(&mut self, s: usize, slot: usize, value: Value) {
        if let Some(old) = self.scopes[s].swap(slot, Some(value)) {
            self.heap.release(old);
        }
    }

    fn drop_acc(&mut self, acc: Option<Value>) {
        if let Some(value) = acc {
            self.heap.release(value);
        }
    }

    /// Whether the byte to the left is an operand: a group close, or a
    /// slot that does not name an applicable scope. Letters whose scope
    /// carries a body act as verbs, never as left operands.
    fn has_left(&self, s: usize, bytes: &[u8], pos: usize) -> bool {
        if pos == 0 {
            return false;
        }
        match Code::decode(bytes[pos - 1]) {
            Some(Code::Close) => true,
            Some(Code::Slot(slot)) => match self.scopes[s].letter_of(slot as usize) {
                Some(letter) => !self.scopes[scope_index(letter)].has_body(),
                None => true,
            },
            _ => false,
        }
    }
}

/// `t::body` or `t::{body}` at the head of a segment.
fn define_form(segment: &[Token]) -> Result<Option<(u8, &[Token])>, VmError> {
    let [Token::Name(letter), Token::Define, body @ ..] = segment else {
        return Ok(None);
    };
    let body = match body {
        [Token::BraceOpen, inner @ .., Token::BraceClose] => inner,
        other => other,
    };
    if body
        .iter()
        .any(|token| matches!(token, Token::BraceOpen | Token::BraceClose))
    {
        return Err(VmError::Fault {
            glyph: ':',
            fault: Fault::Parse,
        });
    }
    Ok(Some((*letter, body)))
}
