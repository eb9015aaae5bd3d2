//! Translations
//!
//! A translation is the recipe the optimizing compiler leaves behind at every bailout
//! point: how to rebuild the unoptimized frames from the optimized one. It is a flat
//! stream of signed integers, each encoded in one to five bytes:
//!
//! ```text
//! bits  = |value| << 1 | sign
//! bytes = 7 bits of `bits` per byte, least significant first,
//!         shifted left by one; bit 0 set while more bytes follow
//! ```
//!
//! Every command is an [`Opcode`] followed by a fixed number of operands. A whole
//! translation starts with `BEGIN(frame_count, js_frame_count)`; each output frame then
//! opens with a frame-kind command followed by one value command per slot it fills.

use std::fmt;

use super::BailoutId;
use crate::error::{fatal, Error, Result};

/// Translation opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // ========== Framing ==========
    /// Operands: frame_count, js_frame_count
    Begin = 0,
    /// Operands: bailout_id, literal_id, height
    JsFrame = 1,
    /// Operands: literal_id, height
    ConstructStubFrame = 2,
    /// Operands: literal_id
    GetterStubFrame = 3,
    /// Operands: literal_id
    SetterStubFrame = 4,
    /// Operands: literal_id, height
    ArgumentsAdaptorFrame = 5,
    /// No operands; the parameter count comes from the stub's code object
    CompiledStubFrame = 6,

    // ========== Values ==========
    /// Tagged value in a general register
    Register = 7,
    /// Untagged int32 in a general register
    Int32Register = 8,
    /// Untagged uint32 in a general register
    Uint32Register = 9,
    /// Unboxed double in a double register
    DoubleRegister = 10,
    /// Tagged value in a stack slot (negative indices address incoming parameters)
    StackSlot = 11,
    Int32StackSlot = 12,
    Uint32StackSlot = 13,
    DoubleStackSlot = 14,
    /// Entry of the code object's literal array
    Literal = 15,
    /// Operands: args_known, args_index, args_length
    ArgumentsObject = 16,
    /// The next command describes the value of the previous one
    Duplicate = 17,
}

impl Opcode {
    pub const ALL: [Opcode; 18] = [
        Opcode::Begin,
        Opcode::JsFrame,
        Opcode::ConstructStubFrame,
        Opcode::GetterStubFrame,
        Opcode::SetterStubFrame,
        Opcode::ArgumentsAdaptorFrame,
        Opcode::CompiledStubFrame,
        Opcode::Register,
        Opcode::Int32Register,
        Opcode::Uint32Register,
        Opcode::DoubleRegister,
        Opcode::StackSlot,
        Opcode::Int32StackSlot,
        Opcode::Uint32StackSlot,
        Opcode::DoubleStackSlot,
        Opcode::Literal,
        Opcode::ArgumentsObject,
        Opcode::Duplicate,
    ];

    /// Decode an opcode from its integer encoding
    pub fn from_i32(value: i32) -> Option<Opcode> {
        usize::try_from(value).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Number of operands that follow the opcode in the stream
    pub fn operand_count(self) -> usize {
        match self {
            Opcode::Duplicate | Opcode::CompiledStubFrame => 0,
            Opcode::GetterStubFrame
            | Opcode::SetterStubFrame
            | Opcode::Register
            | Opcode::Int32Register
            | Opcode::Uint32Register
            | Opcode::DoubleRegister
            | Opcode::StackSlot
            | Opcode::Int32StackSlot
            | Opcode::Uint32StackSlot
            | Opcode::DoubleStackSlot
            | Opcode::Literal => 1,
            Opcode::Begin | Opcode::ArgumentsAdaptorFrame | Opcode::ConstructStubFrame => 2,
            Opcode::JsFrame | Opcode::ArgumentsObject => 3,
        }
    }

    /// Whether this opcode opens an output frame
    pub fn is_frame_kind(self) -> bool {
        matches!(
            self,
            Opcode::JsFrame
                | Opcode::ConstructStubFrame
                | Opcode::GetterStubFrame
                | Opcode::SetterStubFrame
                | Opcode::ArgumentsAdaptorFrame
                | Opcode::CompiledStubFrame
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Begin => "BEGIN",
            Opcode::JsFrame => "JS_FRAME",
            Opcode::ConstructStubFrame => "CONSTRUCT_STUB_FRAME",
            Opcode::GetterStubFrame => "GETTER_STUB_FRAME",
            Opcode::SetterStubFrame => "SETTER_STUB_FRAME",
            Opcode::ArgumentsAdaptorFrame => "ARGUMENTS_ADAPTOR_FRAME",
            Opcode::CompiledStubFrame => "COMPILED_STUB_FRAME",
            Opcode::Register => "REGISTER",
            Opcode::Int32Register => "INT32_REGISTER",
            Opcode::Uint32Register => "UINT32_REGISTER",
            Opcode::DoubleRegister => "DOUBLE_REGISTER",
            Opcode::StackSlot => "STACK_SLOT",
            Opcode::Int32StackSlot => "INT32_STACK_SLOT",
            Opcode::Uint32StackSlot => "UINT32_STACK_SLOT",
            Opcode::DoubleStackSlot => "DOUBLE_STACK_SLOT",
            Opcode::Literal => "LITERAL",
            Opcode::ArgumentsObject => "ARGUMENTS_OBJECT",
            Opcode::Duplicate => "DUPLICATE",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Growable byte stream holding the translations of one code object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationBuffer {
    contents: Vec<u8>,
}

impl TranslationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one integer
    pub fn add(&mut self, value: i32) {
        let negative = value < 0;
        let mut bits = (u64::from(value.unsigned_abs()) << 1) | u64::from(negative);
        loop {
            let next = bits >> 7;
            self.contents.push((((bits << 1) & 0xFF) as u8) | u8::from(next != 0));
            bits = next;
            if bits == 0 {
                break;
            }
        }
    }

    /// Byte offset the next translation will start at
    pub fn current_index(&self) -> usize {
        self.contents.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.contents
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.contents
    }
}

/// Builder for one translation inside a [`TranslationBuffer`]
pub struct Translation<'a> {
    buffer: &'a mut TranslationBuffer,
    index: usize,
}

impl<'a> Translation<'a> {
    /// Start a translation describing `frame_count` output frames
    pub fn new(buffer: &'a mut TranslationBuffer, frame_count: u32, js_frame_count: u32) -> Self {
        let index = buffer.current_index();
        buffer.add(Opcode::Begin as i32);
        buffer.add(frame_count as i32);
        buffer.add(js_frame_count as i32);
        Translation { buffer, index }
    }

    /// Byte offset of the BEGIN command
    pub fn index(&self) -> usize {
        self.index
    }

    fn emit(&mut self, opcode: Opcode, operands: &[i32]) {
        self.buffer.add(opcode as i32);
        for &operand in operands {
            self.buffer.add(operand);
        }
    }

    pub fn begin_js_frame(&mut self, bailout_id: BailoutId, literal_id: u32, height: u32) {
        self.emit(Opcode::JsFrame, &[bailout_id.0 as i32, literal_id as i32, height as i32]);
    }

    pub fn begin_construct_stub_frame(&mut self, literal_id: u32, height: u32) {
        self.emit(Opcode::ConstructStubFrame, &[literal_id as i32, height as i32]);
    }

    pub fn begin_getter_stub_frame(&mut self, literal_id: u32) {
        self.emit(Opcode::GetterStubFrame, &[literal_id as i32]);
    }

    pub fn begin_setter_stub_frame(&mut self, literal_id: u32) {
        self.emit(Opcode::SetterStubFrame, &[literal_id as i32]);
    }

    pub fn begin_arguments_adaptor_frame(&mut self, literal_id: u32, height: u32) {
        self.emit(Opcode::ArgumentsAdaptorFrame, &[literal_id as i32, height as i32]);
    }

    pub fn begin_compiled_stub_frame(&mut self) {
        self.emit(Opcode::CompiledStubFrame, &[]);
    }

    pub fn store_register(&mut self, reg: u32) {
        self.emit(Opcode::Register, &[reg as i32]);
    }

    pub fn store_int32_register(&mut self, reg: u32) {
        self.emit(Opcode::Int32Register, &[reg as i32]);
    }

    pub fn store_uint32_register(&mut self, reg: u32) {
        self.emit(Opcode::Uint32Register, &[reg as i32]);
    }

    pub fn store_double_register(&mut self, reg: u32) {
        self.emit(Opcode::DoubleRegister, &[reg as i32]);
    }

    pub fn store_stack_slot(&mut self, index: i32) {
        self.emit(Opcode::StackSlot, &[index]);
    }

    pub fn store_int32_stack_slot(&mut self, index: i32) {
        self.emit(Opcode::Int32StackSlot, &[index]);
    }

    pub fn store_uint32_stack_slot(&mut self, index: i32) {
        self.emit(Opcode::Uint32StackSlot, &[index]);
    }

    pub fn store_double_stack_slot(&mut self, index: i32) {
        self.emit(Opcode::DoubleStackSlot, &[index]);
    }

    pub fn store_literal(&mut self, literal_id: u32) {
        self.emit(Opcode::Literal, &[literal_id as i32]);
    }

    pub fn store_arguments_object(&mut self, args_known: bool, args_index: i32, args_length: u32) {
        self.emit(
            Opcode::ArgumentsObject,
            &[i32::from(args_known), args_index, args_length as i32],
        );
    }

    pub fn mark_duplicate(&mut self) {
        self.emit(Opcode::Duplicate, &[]);
    }

    /// Append an already decoded command
    pub fn add_command(&mut self, command: &TranslationCommand) {
        let (opcode, operands) = command.parts();
        self.emit(opcode, &operands);
    }
}

/// Cursor over an encoded translation.
///
/// The deoptimizer trusts its input: running past the end or reading an unknown
/// opcode is a structural violation. Tooling that reads untrusted bytes goes through
/// [`decode_commands`] instead.
#[derive(Debug, Clone)]
pub struct TranslationIterator<'a> {
    buffer: &'a [u8],
    index: usize,
}

impl<'a> TranslationIterator<'a> {
    pub fn new(buffer: &'a [u8], index: usize) -> Self {
        TranslationIterator { buffer, index }
    }

    pub fn has_next(&self) -> bool {
        self.index < self.buffer.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Decode the next integer, or `None` if the stream ends or is malformed
    pub fn try_next(&mut self) -> Option<i32> {
        let mut bits: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = *self.buffer.get(self.index)?;
            self.index += 1;
            bits |= u64::from(byte >> 1) << shift;
            if byte & 1 == 0 {
                break;
            }
            shift += 7;
            if shift > 28 {
                return None;
            }
        }
        let magnitude = (bits >> 1) as i64;
        let value = if bits & 1 == 1 { -magnitude } else { magnitude };
        i32::try_from(value).ok()
    }

    /// Decode the next integer
    pub fn next(&mut self) -> i32 {
        let at = self.index;
        match self.try_next() {
            Some(value) => value,
            None => fatal(format!("truncated translation at byte {}", at)),
        }
    }

    /// Decode the next integer as an opcode
    pub fn next_opcode(&mut self) -> Opcode {
        let value = self.next();
        match Opcode::from_i32(value) {
            Some(opcode) => opcode,
            None => fatal(format!("unknown translation opcode {}", value)),
        }
    }

    /// Skip `n` integers
    pub fn skip(&mut self, n: usize) {
        for _ in 0..n {
            self.next();
        }
    }

    /// Read the operands of `opcode`, already consumed, as a typed command
    pub fn operands_of(&mut self, opcode: Opcode) -> TranslationCommand {
        let operands: Vec<i32> = (0..opcode.operand_count()).map(|_| self.next()).collect();
        match TranslationCommand::from_parts(opcode, &operands) {
            Some(command) => command,
            None => fatal(format!("malformed operands {:?} for {}", operands, opcode)),
        }
    }

    /// Decode the next command
    pub fn next_command(&mut self) -> TranslationCommand {
        let opcode = self.next_opcode();
        self.operands_of(opcode)
    }
}

/// One decoded translation command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationCommand {
    Begin { frame_count: u32, js_frame_count: u32 },
    JsFrame { bailout_id: BailoutId, literal_id: u32, height: u32 },
    ConstructStubFrame { literal_id: u32, height: u32 },
    GetterStubFrame { literal_id: u32 },
    SetterStubFrame { literal_id: u32 },
    ArgumentsAdaptorFrame { literal_id: u32, height: u32 },
    CompiledStubFrame,
    Register(u32),
    Int32Register(u32),
    Uint32Register(u32),
    DoubleRegister(u32),
    StackSlot(i32),
    Int32StackSlot(i32),
    Uint32StackSlot(i32),
    DoubleStackSlot(i32),
    Literal(u32),
    ArgumentsObject { args_known: bool, args_index: i32, args_length: u32 },
    Duplicate,
}

impl TranslationCommand {
    pub fn opcode(&self) -> Opcode {
        self.parts().0
    }

    /// Opcode and operands in stream order
    pub fn parts(&self) -> (Opcode, Vec<i32>) {
        use TranslationCommand::*;
        match *self {
            Begin {
                frame_count,
                js_frame_count,
            } => (Opcode::Begin, vec![frame_count as i32, js_frame_count as i32]),
            JsFrame {
                bailout_id,
                literal_id,
                height,
            } => (
                Opcode::JsFrame,
                vec![bailout_id.0 as i32, literal_id as i32, height as i32],
            ),
            ConstructStubFrame { literal_id, height } => {
                (Opcode::ConstructStubFrame, vec![literal_id as i32, height as i32])
            }
            GetterStubFrame { literal_id } => (Opcode::GetterStubFrame, vec![literal_id as i32]),
            SetterStubFrame { literal_id } => (Opcode::SetterStubFrame, vec![literal_id as i32]),
            ArgumentsAdaptorFrame { literal_id, height } => {
                (Opcode::ArgumentsAdaptorFrame, vec![literal_id as i32, height as i32])
            }
            CompiledStubFrame => (Opcode::CompiledStubFrame, vec![]),
            Register(reg) => (Opcode::Register, vec![reg as i32]),
            Int32Register(reg) => (Opcode::Int32Register, vec![reg as i32]),
            Uint32Register(reg) => (Opcode::Uint32Register, vec![reg as i32]),
            DoubleRegister(reg) => (Opcode::DoubleRegister, vec![reg as i32]),
            StackSlot(index) => (Opcode::StackSlot, vec![index]),
            Int32StackSlot(index) => (Opcode::Int32StackSlot, vec![index]),
            Uint32StackSlot(index) => (Opcode::Uint32StackSlot, vec![index]),
            DoubleStackSlot(index) => (Opcode::DoubleStackSlot, vec![index]),
            Literal(id) => (Opcode::Literal, vec![id as i32]),
            ArgumentsObject {
                args_known,
                args_index,
                args_length,
            } => (
                Opcode::ArgumentsObject,
                vec![i32::from(args_known), args_index, args_length as i32],
            ),
            Duplicate => (Opcode::Duplicate, vec![]),
        }
    }

    /// Rebuild a command from its opcode and operands.
    ///
    /// `operands` must hold exactly `opcode.operand_count()` values.
    pub fn from_parts(opcode: Opcode, operands: &[i32]) -> Option<TranslationCommand> {
        use TranslationCommand::*;
        if operands.len() != opcode.operand_count() {
            return None;
        }
        let unsigned = |i: usize| u32::try_from(operands[i]).ok();
        let command = match opcode {
            Opcode::Begin => Begin {
                frame_count: unsigned(0)?,
                js_frame_count: unsigned(1)?,
            },
            Opcode::JsFrame => JsFrame {
                bailout_id: BailoutId(operands[0] as u32),
                literal_id: unsigned(1)?,
                height: unsigned(2)?,
            },
            Opcode::ConstructStubFrame => ConstructStubFrame {
                literal_id: unsigned(0)?,
                height: unsigned(1)?,
            },
            Opcode::GetterStubFrame => GetterStubFrame {
                literal_id: unsigned(0)?,
            },
            Opcode::SetterStubFrame => SetterStubFrame {
                literal_id: unsigned(0)?,
            },
            Opcode::ArgumentsAdaptorFrame => ArgumentsAdaptorFrame {
                literal_id: unsigned(0)?,
                height: unsigned(1)?,
            },
            Opcode::CompiledStubFrame => CompiledStubFrame,
            Opcode::Register => Register(unsigned(0)?),
            Opcode::Int32Register => Int32Register(unsigned(0)?),
            Opcode::Uint32Register => Uint32Register(unsigned(0)?),
            Opcode::DoubleRegister => DoubleRegister(unsigned(0)?),
            Opcode::StackSlot => StackSlot(operands[0]),
            Opcode::Int32StackSlot => Int32StackSlot(operands[0]),
            Opcode::Uint32StackSlot => Uint32StackSlot(operands[0]),
            Opcode::DoubleStackSlot => DoubleStackSlot(operands[0]),
            Opcode::Literal => Literal(unsigned(0)?),
            Opcode::ArgumentsObject => ArgumentsObject {
                args_known: operands[0] != 0,
                args_index: operands[1],
                args_length: unsigned(2)?,
            },
            Opcode::Duplicate => Duplicate,
        };
        Some(command)
    }
}

impl fmt::Display for TranslationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (opcode, operands) = self.parts();
        write!(f, "{}", opcode)?;
        if let TranslationCommand::JsFrame {
            bailout_id,
            literal_id,
            height,
        } = self
        {
            return write!(f, " {{id={}, literal={}, height={}}}", bailout_id, literal_id, height);
        }
        if !operands.is_empty() {
            let rendered: Vec<String> = operands.iter().map(|o| o.to_string()).collect();
            write!(f, " {}", rendered.join(" "))?;
        }
        Ok(())
    }
}

/// Encode `commands` into a fresh byte stream
pub fn encode(commands: &[TranslationCommand]) -> Vec<u8> {
    let mut buffer = TranslationBuffer::new();
    for command in commands {
        let (opcode, operands) = command.parts();
        buffer.add(opcode as i32);
        for operand in operands {
            buffer.add(operand);
        }
    }
    buffer.into_bytes()
}

/// Decode a whole byte stream into commands.
///
/// Unlike [`TranslationIterator`], malformed input is reported as an error.
pub fn decode_commands(bytes: &[u8]) -> Result<Vec<TranslationCommand>> {
    let mut iterator = TranslationIterator::new(bytes, 0);
    let mut commands = Vec::new();
    while iterator.has_next() {
        let at = iterator.index();
        let value = iterator
            .try_next()
            .ok_or_else(|| Error::decode(format!("truncated integer at byte {}", at)))?;
        let opcode = Opcode::from_i32(value)
            .ok_or_else(|| Error::decode(format!("unknown opcode {} at byte {}", value, at)))?;
        let mut operands = Vec::with_capacity(opcode.operand_count());
        for _ in 0..opcode.operand_count() {
            let operand = iterator
                .try_next()
                .ok_or_else(|| Error::decode(format!("{} at byte {} is missing operands", opcode, at)))?;
            operands.push(operand);
        }
        let command = TranslationCommand::from_parts(opcode, &operands)
            .ok_or_else(|| Error::decode(format!("{} at byte {} has invalid operands {:?}", opcode, at, operands)))?;
        commands.push(command);
    }
    Ok(commands)
}

/// Parse a hex dump such as `"00 04 02"` or `"000402"` into bytes
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
    let digits = digits.strip_prefix("0x").unwrap_or(&digits);
    if digits.len() % 2 != 0 {
        return Err(Error::decode("odd number of hex digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| Error::decode(format!("invalid hex byte '{}'", &digits[i..i + 2])))
        })
        .collect()
}
