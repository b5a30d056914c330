//! Integration tests for layout composition and path resolution

use serde::Serialize;
use vellum::{
    layout::value::{ADDRESS, F64, I16, I32, I64, U8},
    ByteOrder, CarrierKind, ErrorKind, MemoryLayout, PathElement, Session,
};

#[cfg(test)]
mod layout_tests {
    use super::*;

    fn point() -> MemoryLayout {
        MemoryLayout::struct_layout([I32.with_name("x"), I32.with_name("y")])
            .unwrap()
            .with_name("point")
    }

    #[test]
    fn test_struct_offsets_follow_declaration_order() {
        let layout = point();
        assert_eq!(layout.byte_size().unwrap(), 8);
        assert_eq!(layout.byte_alignment(), 4);
        assert_eq!(
            layout.byte_offset(&[PathElement::group_element("x")]).unwrap(),
            0
        );
        assert_eq!(
            layout.byte_offset(&[PathElement::group_element("y")]).unwrap(),
            4
        );
    }

    #[test]
    fn test_misaligned_member_rejected() {
        let err = MemoryLayout::struct_layout([U8.to_layout(), I32.to_layout()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let padded = MemoryLayout::struct_layout([
            U8.to_layout(),
            MemoryLayout::padding_layout(3).unwrap(),
            I32.to_layout(),
        ])
        .unwrap();
        assert_eq!(padded.byte_size().unwrap(), 8);
    }

    #[test]
    fn test_c_struct_inserts_padding() {
        let layout = MemoryLayout::c_struct([
            U8.with_name("tag").to_layout(),
            I64.with_name("value").to_layout(),
            I16.with_name("extra").to_layout(),
        ])
        .unwrap();
        assert_eq!(layout.byte_size().unwrap(), 24);
        assert_eq!(layout.byte_alignment(), 8);
        assert_eq!(
            layout.byte_offset(&[PathElement::group_element("value")]).unwrap(),
            8
        );
        assert_eq!(
            layout.byte_offset(&[PathElement::group_element("extra")]).unwrap(),
            16
        );
    }

    #[test]
    fn test_union_size_is_largest_member() {
        let layout = MemoryLayout::union_layout([
            I32.with_name("i").to_layout(),
            F64.with_name("d").to_layout(),
            U8.with_name("b").to_layout(),
        ])
        .unwrap();
        assert_eq!(layout.byte_size().unwrap(), 8);
        assert_eq!(layout.byte_alignment(), 8);
        assert_eq!(
            layout.byte_offset(&[PathElement::group_element("b")]).unwrap(),
            0
        );
    }

    #[test]
    fn test_nested_sequence_paths() {
        let polygon = MemoryLayout::struct_layout([
            I32.with_name("count").to_layout(),
            MemoryLayout::sequence_layout(4, point())
                .unwrap()
                .with_name("vertices"),
        ])
        .unwrap();
        assert_eq!(polygon.byte_size().unwrap(), 36);

        let y_of_third = [
            PathElement::group_element("vertices"),
            PathElement::sequence_element(2),
            PathElement::group_element("y"),
        ];
        assert_eq!(polygon.byte_offset(&y_of_third).unwrap(), 4 + 2 * 8 + 4);

        let open = [
            PathElement::group_element("vertices"),
            PathElement::sequence_open(),
            PathElement::group_element("x"),
        ];
        assert_eq!(polygon.byte_offset_indexed(&open, &[3]).unwrap(), 4 + 3 * 8);
        assert_eq!(
            polygon.byte_offset_indexed(&open, &[4]).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );

        let selected = polygon.select(&y_of_third).unwrap();
        assert_eq!(selected.name(), Some("y"));
        assert_eq!(selected.byte_size().unwrap(), 4);
    }

    #[test]
    fn test_unknown_member_and_bad_steps() {
        let layout = point();
        assert!(layout
            .byte_offset(&[PathElement::group_element("z")])
            .is_err());
        assert!(layout
            .byte_offset(&[PathElement::sequence_element(0)])
            .is_err());
        assert!(I32
            .to_layout()
            .byte_offset(&[PathElement::dereference()])
            .is_err());
    }

    #[test]
    fn test_sequence_size_overflow() {
        let err = MemoryLayout::sequence_layout(u64::MAX, I64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_unbounded_sequence_has_no_size() {
        let layout = MemoryLayout::unbounded_sequence(I32).unwrap();
        assert!(!layout.has_known_size());
        assert!(layout.byte_size().is_err());
        assert_eq!(layout.byte_alignment(), 4);
    }

    #[test]
    fn test_alignment_derivation() {
        assert!(I32.with_byte_alignment(3).is_err());
        let relaxed = I32.with_byte_alignment(1).unwrap();
        assert_eq!(relaxed.byte_alignment(), 1);
        assert_eq!(relaxed.byte_size(), 4);

        let big = I64.with_order(ByteOrder::BigEndian);
        assert_eq!(big.order(), ByteOrder::BigEndian);
        assert_ne!(big.to_layout(), I64.to_layout());
    }

    #[test]
    fn test_names_do_not_affect_size() {
        let named = point();
        let unnamed = named.without_name();
        assert_eq!(named.byte_size().unwrap(), unnamed.byte_size().unwrap());
        assert_ne!(named, unnamed);
        assert_eq!(named.without_name(), unnamed);
    }

    #[test]
    fn test_address_layout_with_target() {
        // SAFETY: only the layout is inspected, nothing is dereferenced
        let pointer = unsafe { ADDRESS.with_target_layout(point()) };
        let wrapper = MemoryLayout::struct_layout([pointer.with_name("p")]).unwrap();
        let y = [
            PathElement::group_element("p"),
            PathElement::dereference(),
            PathElement::group_element("y"),
        ];
        assert_eq!(wrapper.select(&y).unwrap().byte_size().unwrap(), 4);
    }

    #[test]
    fn test_layout_serde_round_trip() {
        let layout = MemoryLayout::c_struct([
            U8.with_name("flag").to_layout(),
            MemoryLayout::sequence_layout(3, F64).unwrap().with_name("samples"),
        ])
        .unwrap();

        let encoded = bincode::serialize(&layout).unwrap();
        let decoded: MemoryLayout = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, layout);
        assert_eq!(decoded.byte_size().unwrap(), 32);
    }

    // Hand-built encodings mirroring the serialized shape of layout trees
    #[derive(Serialize)]
    enum EncodedLayout {
        Value(EncodedValue),
        Sequence(EncodedSequence),
        Struct(EncodedGroup),
    }

    #[derive(Serialize)]
    struct EncodedValue {
        carrier: CarrierKind,
        order: ByteOrder,
        alignment: usize,
        name: Option<String>,
    }

    #[derive(Serialize)]
    struct EncodedSequence {
        element: Box<EncodedLayout>,
        count: Option<u64>,
        size: Option<usize>,
        alignment: usize,
        name: Option<String>,
    }

    #[derive(Serialize)]
    struct EncodedGroup {
        members: Vec<EncodedLayout>,
        offsets: Vec<usize>,
        size: usize,
        alignment: usize,
        name: Option<String>,
    }

    fn encoded_i32(alignment: usize) -> EncodedLayout {
        EncodedLayout::Value(EncodedValue {
            carrier: CarrierKind::I32,
            order: ByteOrder::NATIVE,
            alignment,
            name: None,
        })
    }

    fn encoded_pair(offsets: Vec<usize>, size: usize, alignment: usize) -> EncodedLayout {
        EncodedLayout::Struct(EncodedGroup {
            members: vec![encoded_i32(4), encoded_i32(4)],
            offsets,
            size,
            alignment,
            name: None,
        })
    }

    fn encoded_i32_sequence(count: Option<u64>, size: Option<usize>) -> EncodedLayout {
        EncodedLayout::Sequence(EncodedSequence {
            element: Box::new(encoded_i32(4)),
            count,
            size,
            alignment: 4,
            name: None,
        })
    }

    fn decode(encoded: &EncodedLayout) -> bincode::Result<MemoryLayout> {
        bincode::deserialize(&bincode::serialize(encoded).unwrap())
    }

    #[test]
    fn test_decoding_checks_value_alignment() {
        assert_eq!(decode(&encoded_i32(4)).unwrap(), I32.to_layout());
        assert_eq!(
            decode(&encoded_i32(1)).unwrap(),
            I32.with_byte_alignment(1).unwrap().to_layout()
        );
        for alignment in [0, 3, 6] {
            assert!(decode(&encoded_i32(alignment)).is_err());
        }
    }

    #[test]
    fn test_decoding_recomputes_group_geometry() {
        let pair = MemoryLayout::struct_layout([I32, I32]).unwrap();
        assert_eq!(decode(&encoded_pair(vec![0, 4], 8, 4)).unwrap(), pair);
        assert_eq!(
            decode(&encoded_pair(vec![0, 4], 8, 16)).unwrap(),
            pair.with_byte_alignment(16).unwrap()
        );

        assert!(decode(&encoded_pair(vec![0, 64], 8, 4)).is_err());
        assert!(decode(&encoded_pair(vec![0, 4], 1 << 40, 4)).is_err());
        assert!(decode(&encoded_pair(vec![0], 8, 4)).is_err());
        assert!(decode(&encoded_pair(vec![0, 4], 8, 2)).is_err());
        assert!(decode(&encoded_pair(vec![0, 4], 8, 0)).is_err());
    }

    #[test]
    fn test_decoding_recomputes_sequence_size() {
        assert_eq!(
            decode(&encoded_i32_sequence(Some(3), Some(12))).unwrap(),
            MemoryLayout::sequence_layout(3, I32).unwrap()
        );
        assert_eq!(
            decode(&encoded_i32_sequence(None, None)).unwrap(),
            MemoryLayout::unbounded_sequence(I32).unwrap()
        );
        assert!(decode(&encoded_i32_sequence(Some(3), Some(4096))).is_err());
        assert!(decode(&encoded_i32_sequence(Some(3), None)).is_err());
        assert!(decode(&encoded_i32_sequence(None, Some(usize::MAX))).is_err());
    }

    #[test]
    fn test_decoded_address_has_no_target() {
        let targeted = unsafe { ADDRESS.with_target_layout(point()) };
        let encoded = bincode::serialize(&targeted.to_layout()).unwrap();
        let decoded: MemoryLayout = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, ADDRESS.to_layout());

        // a trailing target appended to a plain address is never read back
        let mut forged = bincode::serialize(&ADDRESS.to_layout()).unwrap();
        forged.push(1);
        forged.extend(bincode::serialize(&MemoryLayout::unbounded_sequence(U8).unwrap()).unwrap());
        let session = Session::confined();
        let holder = session.allocate(8, 8).unwrap();
        if let Ok(decoded) = bincode::deserialize::<MemoryLayout>(&forged) {
            let address = decoded.as_address_layout().unwrap();
            assert!(address.target_layout().is_none());
            assert_eq!(holder.get_address(&address, 0).unwrap().byte_size(), 0);
        }
        session.close().unwrap();
    }

    #[test]
    fn test_display_mentions_members() {
        let rendered = point().to_string();
        assert!(rendered.contains("x"));
        assert!(rendered.contains("y"));
    }
}
