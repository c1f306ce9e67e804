// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Block records read from a contiguous memory image.

use std::fmt::{self, Display};

use log::{debug, warn};
use snafu::{ResultExt, Snafu, ensure};

use crate::abi::{
    BYREF_HEADER_SIZE, BlockFlags, BlockLiteralHeader, ByrefCopyDispose, ByrefFlags, ByrefHeader,
    ByrefLayout, DescriptorCopyDispose, DescriptorHeader, DescriptorSignature,
    LITERAL_HEADER_SIZE,
};
use crate::errors::{DebugTrace, trace_error};
use crate::mem::{self, C_STR_LIMIT, Memory};

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, visibility(pub), context(suffix(false)))]
pub enum Error {
    #[snafu(display("Failed to read {what} at {addr:#x}"))]
    Read {
        what: &'static str,
        addr: u64,
        source: Box<mem::Error>,
    },
    #[snafu(display("Block literal at {address:#x} has a null invoke pointer"))]
    ZeroInvoke { address: u64 },
    #[snafu(display("Block literal at {address:#x} has a null descriptor pointer"))]
    ZeroDescriptor { address: u64 },
    #[snafu(display("{kind} block at {address:#x} has contradicting flags {flags:#010x}"))]
    GlobalFlagMismatch {
        kind: BlockKind,
        address: u64,
        flags: u32,
    },
    #[snafu(display("Descriptor at {address:#x} declares size {size:#x}, below the header size"))]
    SizeInvariantViolation { address: u64, size: u64 },
    #[snafu(display("Byref at {address:#x} has unknown layout kind {kind}"))]
    UnknownByrefLayout { address: u64, kind: u8 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Global,
    Stack,
}

impl Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKind::Global => f.write_str("Global"),
            BlockKind::Stack => f.write_str("Stack"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLiteral {
    pub kind: BlockKind,
    /// Data address of a global block, or the address of the instruction
    /// storing the class pointer of a stack block.
    pub address: u64,
    pub isa: u64,
    pub flags: BlockFlags,
    pub reserved: u32,
    pub invoke: u64,
    pub descriptor: u64,
}

impl BlockLiteral {
    pub fn new(
        kind: BlockKind,
        address: u64,
        isa: u64,
        flags: BlockFlags,
        reserved: u32,
        invoke: u64,
        descriptor: u64,
    ) -> Result<Self> {
        ensure!(invoke != 0, error::ZeroInvoke { address });
        ensure!(descriptor != 0, error::ZeroDescriptor { address });
        let is_global = flags.contains(BlockFlags::IS_GLOBAL);
        ensure!(
            is_global == (kind == BlockKind::Global),
            error::GlobalFlagMismatch {
                kind,
                address,
                flags: flags.bits()
            }
        );
        Ok(BlockLiteral {
            kind,
            address,
            isa,
            flags,
            reserved,
            invoke,
            descriptor,
        })
    }
}

impl Display for BlockLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} block at {:x} with flags {:08x} invoke {:x} descriptor {:x}",
            self.kind,
            self.address,
            self.flags.bits(),
            self.invoke,
            self.descriptor
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub address: u64,
    /// Flags of the owning literal, which decide the trailing fields.
    pub block_flags: BlockFlags,
    pub reserved: u64,
    pub size: u64,
    pub copy: Option<u64>,
    pub dispose: Option<u64>,
    pub signature: Option<u64>,
    pub layout: Option<u64>,
    pub signature_raw: Option<String>,
    /// End of the layout bytecode, once decoded.
    pub layout_end: Option<u64>,
}

impl BlockDescriptor {
    /// Bytes of captured variables trailing the literal header.
    pub fn imported_variables_size(&self) -> u64 {
        self.size - LITERAL_HEADER_SIZE
    }

    pub fn has_copy_dispose(&self) -> bool {
        self.block_flags.contains(BlockFlags::HAS_COPY_DISPOSE)
    }

    pub fn has_signature(&self) -> bool {
        self.block_flags.contains(BlockFlags::HAS_SIGNATURE)
    }

    pub fn has_extended_layout(&self) -> bool {
        self.block_flags.contains(BlockFlags::HAS_EXTENDED_LAYOUT)
    }
}

impl Display for BlockDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block descriptor at {:x} size {:#x}", self.address, self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByrefPayload {
    /// Captured storage described by a nested layout value.
    Extended { layout: u64 },
    NonObject,
    Strong,
    Weak,
    Unretained,
}

impl ByrefPayload {
    /// Selects the payload from the layout kind of `flags`. `layout` is
    /// only consulted for the extended kind.
    pub fn from_flags(address: u64, flags: ByrefFlags, layout: u64) -> Result<Self> {
        let payload = match flags.layout_kind() {
            ByrefLayout::EXTENDED => ByrefPayload::Extended { layout },
            ByrefLayout::NON_OBJECT => ByrefPayload::NonObject,
            ByrefLayout::STRONG => ByrefPayload::Strong,
            ByrefLayout::WEAK => ByrefPayload::Weak,
            ByrefLayout::UNRETAINED => ByrefPayload::Unretained,
            kind => return error::UnknownByrefLayout { address, kind: kind.raw() }.fail(),
        };
        Ok(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByrefVariable {
    pub address: u64,
    pub isa: u64,
    pub forwarding: u64,
    pub flags: ByrefFlags,
    pub size: u32,
    pub keep: Option<u64>,
    pub destroy: Option<u64>,
    pub payload: ByrefPayload,
}

impl ByrefVariable {
    /// Offset of the payload from the start of the cell.
    pub fn payload_offset(flags: ByrefFlags) -> u64 {
        if flags.has_copy_dispose() {
            BYREF_HEADER_SIZE + size_of::<ByrefCopyDispose>() as u64
        } else {
            BYREF_HEADER_SIZE
        }
    }
}

impl Display for ByrefVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block byref at {:x} flags {:08x} size {:#x}",
            self.address, self.flags.bits(), self.size
        )
    }
}

pub fn decode_literal<M>(memory: &M, address: u64, kind: BlockKind) -> Result<BlockLiteral>
where
    M: Memory,
{
    let header: BlockLiteralHeader = memory.read_obj(address).context(error::Read {
        what: "block literal",
        addr: address,
    })?;
    let literal = BlockLiteral::new(
        kind,
        address,
        header.isa.get(),
        BlockFlags::from_bits_retain(header.flags.get()),
        header.reserved.get(),
        header.invoke.get(),
        header.descriptor.get(),
    )?;
    debug!("{literal}");
    Ok(literal)
}

pub fn decode_descriptor<M>(memory: &M, address: u64, owning_flags: BlockFlags) -> Result<BlockDescriptor>
where
    M: Memory,
{
    let header: DescriptorHeader = memory.read_obj(address).context(error::Read {
        what: "descriptor",
        addr: address,
    })?;
    let size = header.size.get();
    ensure!(
        size >= LITERAL_HEADER_SIZE,
        error::SizeInvariantViolation { address, size }
    );
    let mut descriptor = BlockDescriptor {
        address,
        block_flags: owning_flags,
        reserved: header.reserved.get(),
        size,
        copy: None,
        dispose: None,
        signature: None,
        layout: None,
        signature_raw: None,
        layout_end: None,
    };

    let mut cursor = address + size_of::<DescriptorHeader>() as u64;
    if descriptor.has_copy_dispose() {
        let helpers: DescriptorCopyDispose = memory.read_obj(cursor).context(error::Read {
            what: "copy and dispose helpers",
            addr: cursor,
        })?;
        descriptor.copy = Some(helpers.copy.get());
        descriptor.dispose = Some(helpers.dispose.get());
        cursor += size_of::<DescriptorCopyDispose>() as u64;
    }
    if descriptor.has_signature() {
        let sig: DescriptorSignature = memory.read_obj(cursor).context(error::Read {
            what: "signature and layout",
            addr: cursor,
        })?;
        let signature = sig.signature.get();
        if signature != 0 {
            match memory.read_c_str(signature, C_STR_LIMIT) {
                Ok(text) => descriptor.signature_raw = Some(text),
                Err(e) => warn!("{descriptor}: cannot read signature at {signature:#x}: {e}"),
            }
        }
        descriptor.signature = Some(signature);
        descriptor.layout = Some(sig.layout.get());
    }
    debug!("{descriptor}");
    Ok(descriptor)
}

/// Decodes a byref cell stored in a data section.
pub fn decode_byref<M>(memory: &M, address: u64) -> Result<ByrefVariable>
where
    M: Memory,
{
    let header: ByrefHeader = memory.read_obj(address).context(error::Read {
        what: "byref header",
        addr: address,
    })?;
    let flags = ByrefFlags::from(header.flags.get());
    let (keep, destroy) = if flags.has_copy_dispose() {
        let addr = address + BYREF_HEADER_SIZE;
        let helpers: ByrefCopyDispose = memory.read_obj(addr).context(error::Read {
            what: "byref keep and destroy helpers",
            addr,
        })?;
        (Some(helpers.keep.get()), Some(helpers.destroy.get()))
    } else {
        (None, None)
    };
    let layout = if flags.layout_kind() == ByrefLayout::EXTENDED {
        let addr = address + ByrefVariable::payload_offset(flags);
        memory.read_u64(addr).context(error::Read {
            what: "byref layout",
            addr,
        })?
    } else {
        0
    };
    let byref = ByrefVariable {
        address,
        isa: header.isa.get(),
        forwarding: header.forwarding.get(),
        flags,
        size: header.size.get(),
        keep,
        destroy,
        payload: ByrefPayload::from_flags(address, flags, layout)?,
    };
    debug!("{byref}");
    Ok(byref)
}

#[cfg(test)]
#[path = "decode_test.rs"]
mod tests;
