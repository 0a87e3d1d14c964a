//! Data types bound directly from an architecture description: Fragment,
//! Format, Instruction, SegmentDescription, Relocation.

/// The kind of value a [`Fragment`] encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentType {
    /// An absolute address; may be relocated.
    Address,
    /// A PC-relative address; signed, never relocated at assembly time.
    RAddress,
    /// A register number.
    Reg,
    /// A signed immediate.
    Signed,
    /// An unsigned immediate.
    Unsigned,
}

/// A named bit-field template.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Fragment name, as referenced by formats and instruction token
    /// patterns.
    pub name: String,
    /// The kind of value this fragment encodes.
    pub r#type: FragmentType,
    /// Width, in bits, of the value as parsed from its token.
    pub width: u32,
    /// Width, in bits, of the value once packed into the instruction
    /// stream. Defaults to `width`.
    pub owidth: u32,
    /// `n` such that the parsed value must be divisible by `2^(n-1)`.
    /// Defaults to `1` (no constraint).
    pub alignment: u32,
    /// Subtracted from the raw magnitude before range-checking; used for
    /// register encodings such as `$1..$8` mapping to `0..7`.
    pub offset: u32,
    /// If `true` and `owidth > width`, the value is not left-shifted when
    /// widened.
    pub right_align: bool,
    /// Alias under which the packed value is stored, collapsing several
    /// token slots into one packed field.
    pub group: Option<String>,
    /// Name of the [`Relocation`] kind to record when this fragment's
    /// operand is an as-yet-undefined label.
    pub relocation: Option<String>,
}

/// A named template: an ordered sequence of fragments totaling the
/// instruction's bit width.
#[derive(Debug, Clone)]
pub struct Format {
    /// Format name, as referenced by instructions.
    pub name: String,
    /// Total instruction width, in bits. Always a multiple of 8.
    pub width: u32,
    /// Ordered fragment names that make up this format.
    pub fragments: Vec<String>,
}

/// The sentinel format name marking a composite (macro) instruction — one
/// with no format row of its own, only [`Component`]s.
pub const COMPOSITE_FORMAT: &str = "composite";

/// The literal value stored for a fragment in an instruction's `defaults`
/// map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    /// The `%next%` sentinel: resolves to the segment's next placement
    /// address at emission time.
    Next,
    /// A literal value, parsed once at load time.
    Literal(u32),
}

/// One instruction variant. Multiple instructions may share a mnemonic —
/// they are variants to be disambiguated by token match at assembly time.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// The mnemonic a source line's first identifier must match.
    pub mnemonic: String,
    /// The format this instruction packs into, or [`COMPOSITE_FORMAT`].
    pub format: String,
    /// The token pattern: one entry per operand token, either a fragment
    /// name or a required literal punctuator (`:,` for instance).
    pub fragments: Vec<String>,
    /// Per-fragment default, populated for fragments the format lists but
    /// the token pattern never supplies a value for.
    pub defaults: std::collections::HashMap<String, DefaultValue>,
    /// Non-zero id making this instruction indexable by a composite's
    /// components.
    pub id: u32,
    /// Expansion recipe, non-empty only when `format == COMPOSITE_FORMAT`.
    pub components: Vec<Component>,
}

/// One real instruction a composite mnemonic expands into.
#[derive(Debug, Clone)]
pub struct Component {
    /// The id of the real [`Instruction`] this component packs.
    pub id: u32,
    /// How the winning composite candidate's fragment values feed this
    /// component's fragments.
    pub replacements: Vec<Replacement>,
}

/// One fragment-to-fragment forwarding rule inside a [`Component`].
#[derive(Debug, Clone)]
pub struct Replacement {
    /// Fragment name on the composite candidate to read from.
    pub source: String,
    /// Fragment name on the expanded component to write to.
    pub dest: String,
    /// Right-shift applied to the forwarded value (or to a forwarded
    /// pending reference's resolved value).
    pub shift: u32,
    /// Relocation name overriding a forwarded pending reference's, if any.
    pub relocation: Option<String>,
}

/// Architecture-declared description of a segment, before any bytes have
/// been assembled into it.
#[derive(Debug, Clone)]
pub struct SegmentDescription {
    /// Segment name, referenced by `.segment`/`.text`/`.data`/etc.
    pub name: String,
    /// Base virtual address.
    pub start: u32,
    /// Maximum size, in bytes; `0` means unbounded.
    pub size: u32,
    /// Required alignment.
    pub align: u32,
    /// Whether unused bytes should be fill-initialized rather than left at
    /// zero (architecture-specific; this crate only carries the flag).
    pub fill: bool,
    /// `true` for BSS-like segments with no file bytes.
    pub ephemeral: bool,
    /// `true` if the segment may not be written to at runtime.
    pub read_only: bool,
    /// `true` if the segment holds executable code.
    pub executable: bool,
    /// `true` if the segment's final address is assigned by the linker
    /// rather than fixed by the architecture.
    pub relocatable: bool,
}

/// A named relocation kind, mapping a symbolic name used by fragments to
/// the numeric type recorded in relocation records.
#[derive(Debug, Clone)]
pub struct Relocation {
    /// Relocation name, as referenced by a [`Fragment`]'s `relocation`
    /// field.
    pub name: String,
    /// Numeric relocation type stored in the object file and consumed by
    /// the linker.
    pub r#type: u8,
}
