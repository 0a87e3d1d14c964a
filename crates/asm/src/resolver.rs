//! Reference resolution: patching pending label references back into their
//! owning segments once every label in the assembly unit is known.

use std::collections::HashMap;

use crate::{error::LineError, segment::Segment};

/// Walk every segment's pending references, patching the ones that resolve.
///
/// When `only_relative` is `true`, only PC-relative references that resolve
/// to a label defined in this assembly unit are patched; everything else
/// (undefined labels, or absolute references to a defined label) is left
/// untouched so it can survive into the object file as a relocation record.
/// An undefined label is then *not* an error — it may yet be resolved by the
/// linker.
///
/// When `only_relative` is `false`, every reference must resolve: an
/// undefined label is a hard [`LineError::Reference`]. This is used for
/// final, non-relocatable output (`.string`-less whole-program assembly, or
/// the equivalent of `ld`'s own final link).
///
/// Returns the absolute address of every reference that did resolve
/// (including ones already known from a previous pass), keyed by label —
/// used to emit an optional symbol dump.
pub(crate) fn resolve_references(
    segments: &mut HashMap<String, Segment>,
    only_relative: bool,
) -> Result<HashMap<String, u32>, LineError> {
    let mut symbols = HashMap::new();

    // A label's defining segment and its offset within it, collected once
    // up front since references may point across segments.
    let mut label_locations: HashMap<String, (String, u32)> = HashMap::new();
    for (segment_name, segment) in segments.iter() {
        for (label, offset) in segment.labels() {
            label_locations.insert(label.clone(), (segment_name.clone(), *offset));
        }
    }

    for segment_name in segments.keys().cloned().collect::<Vec<_>>() {
        let references = segments[&segment_name].references().to_vec();

        for reference in references {
            let Some((label_segment_name, label_offset)) = label_locations.get(&reference.label) else {
                if only_relative {
                    continue;
                }

                return Err(LineError::reference(format!(
                    "undefined reference to '{}'",
                    reference.label
                )));
            };

            let label_segment = &segments[label_segment_name];
            let value = label_offset + label_segment.start_address();

            let mut modified_value = value;

            if reference.relative != 0 {
                modified_value = label_offset.wrapping_sub(reference.relative);
            } else if only_relative {
                continue;
            }

            symbols.insert(reference.label.clone(), value);

            if reference.shift > 0 {
                modified_value >>= reference.shift;
            }

            let target_segment = segments.get_mut(&segment_name).expect("segment exists");
            let mut bit = reference.bit;
            target_segment.pack(
                modified_value,
                reference.width,
                crate::segment::PackTarget::At(reference.offset),
                &mut bit,
            )?;
        }
    }

    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Reference;
    use weld_arch::SegmentDescription;

    fn text_description() -> SegmentDescription {
        SegmentDescription {
            name: "text".to_string(),
            start: 0,
            size: 0,
            align: 1,
            fill: false,
            ephemeral: false,
            read_only: false,
            executable: true,
            relocatable: true,
        }
    }

    #[test]
    fn test_resolves_absolute_reference() {
        let mut segments = HashMap::new();
        let mut text = Segment::new(text_description());

        // A 4-byte placeholder, with a label defined at offset 2.
        text.push_byte(0).unwrap();
        text.push_byte(0).unwrap();
        text.add_label("target");
        text.push_byte(0).unwrap();
        text.push_byte(0).unwrap();

        text.add_reference(Reference {
            label: "target".to_string(),
            offset: 0,
            bit: 0,
            width: 16,
            shift: 0,
            relative: 0,
            relocation_type: 0,
        });

        segments.insert("text".to_string(), text);

        let symbols = resolve_references(&mut segments, false).unwrap();

        assert_eq!(symbols.get("target"), Some(&2));
        assert_eq!(&segments["text"].data()[0..2], &[0x00, 0x02]);
    }

    #[test]
    fn test_only_relative_skips_absolute_and_undefined() {
        let mut segments = HashMap::new();
        let mut text = Segment::new(text_description());

        text.push_byte(0).unwrap();
        text.push_byte(0).unwrap();
        text.add_label("target");

        text.add_reference(Reference {
            label: "target".to_string(),
            offset: 0,
            bit: 0,
            width: 16,
            shift: 0,
            relative: 0,
            relocation_type: 0,
        });
        text.add_reference(Reference {
            label: "elsewhere".to_string(),
            offset: 0,
            bit: 0,
            width: 16,
            shift: 0,
            relative: 0,
            relocation_type: 0,
        });

        segments.insert("text".to_string(), text);

        let symbols = resolve_references(&mut segments, true).unwrap();

        assert!(symbols.is_empty());
        assert_eq!(&segments["text"].data()[0..2], &[0x00, 0x00]);
    }

    #[test]
    fn test_undefined_is_an_error_when_not_only_relative() {
        let mut segments = HashMap::new();
        let mut text = Segment::new(text_description());

        text.push_byte(0).unwrap();
        text.add_reference(Reference {
            label: "missing".to_string(),
            offset: 0,
            bit: 0,
            width: 8,
            shift: 0,
            relative: 0,
            relocation_type: 0,
        });

        segments.insert("text".to_string(), text);

        assert!(resolve_references(&mut segments, false).is_err());
    }

    #[test]
    fn test_relative_reference_patches_local_offset_delta() {
        let mut text = Segment::new(text_description());

        // An instruction started at offset 0, its address operand anchored
        // at byte 0; label defined 4 bytes later.
        text.push_byte(0).unwrap();
        text.push_byte(0).unwrap();
        text.push_byte(0).unwrap();
        text.push_byte(0).unwrap();
        text.add_label("target");

        text.add_reference(Reference {
            label: "target".to_string(),
            offset: 0,
            bit: 0,
            width: 16,
            shift: 0,
            relative: 2,
            relocation_type: 1,
        });

        let mut segments = HashMap::new();
        segments.insert("text".to_string(), text);

        let symbols = resolve_references(&mut segments, false).unwrap();
        assert_eq!(symbols.get("target"), Some(&4));
        // modified_value = label_offset(4) - relative(2) = 2
        assert_eq!(&segments["text"].data()[0..2], &[0x00, 0x02]);
    }
}
