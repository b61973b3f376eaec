use byteorder::{BigEndian, WriteBytesExt};

use crate::error::EncodeError;

use super::types::{
    Bundle, CompressionKind, HEADER_LEN, MAGIC, NO_NAME, PropertyValue, payload_checksum,
};

/// Serialize a bundle. Header counts are derived from the actual arrays and
/// the checksum is computed after the full payload is laid down, so the
/// emitted header always matches the bytes that follow it.
pub fn encode(bundle: &Bundle) -> Result<Vec<u8>, EncodeError> {
    let string_table = encode_string_table(bundle)?;
    let (element_data, property_count) = encode_elements(bundle)?;

    let element_count =
        u32::try_from(bundle.elements.len()).map_err(|_| EncodeError::CountOverflow {
            what: "element",
            count: bundle.elements.len(),
        })?;
    let string_table_size =
        u32::try_from(string_table.len()).map_err(|_| EncodeError::CountOverflow {
            what: "string table byte",
            count: string_table.len(),
        })?;
    let element_data_size =
        u32::try_from(element_data.len()).map_err(|_| EncodeError::CountOverflow {
            what: "element byte",
            count: element_data.len(),
        })?;

    let mut payload = string_table;
    payload.extend_from_slice(&element_data);
    let uncompressed_size =
        u32::try_from(payload.len()).map_err(|_| EncodeError::CountOverflow {
            what: "payload byte",
            count: payload.len(),
        })?;
    let checksum = payload_checksum(&payload);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.write_u32::<BigEndian>(MAGIC).expect("vec write");
    out.write_u16::<BigEndian>(bundle.version.0).expect("vec write");
    out.write_u16::<BigEndian>(bundle.version.1).expect("vec write");
    out.write_u16::<BigEndian>(bundle.version.2).expect("vec write");
    out.write_u16::<BigEndian>(bundle.flags).expect("vec write");
    out.write_u32::<BigEndian>(element_count).expect("vec write");
    out.write_u32::<BigEndian>(property_count).expect("vec write");
    out.write_u32::<BigEndian>(string_table_size).expect("vec write");
    out.write_u32::<BigEndian>(element_data_size).expect("vec write");
    out.write_u32::<BigEndian>(checksum).expect("vec write");
    out.write_u8(CompressionKind::None.to_wire()).expect("vec write");
    out.write_u32::<BigEndian>(uncompressed_size).expect("vec write");
    out.resize(HEADER_LEN, 0);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn encode_string_table(bundle: &Bundle) -> Result<Vec<u8>, EncodeError> {
    if bundle.strings.len() >= NO_NAME as usize {
        return Err(EncodeError::StringTableOverflow(bundle.strings.len()));
    }

    let mut out = Vec::new();
    if bundle.strings.is_empty() && bundle.elements.is_empty() {
        return Ok(out);
    }
    out.write_u32::<BigEndian>(bundle.strings.len() as u32)
        .expect("vec write");
    for entry in &bundle.strings {
        let len = u16::try_from(entry.len()).map_err(|_| EncodeError::CountOverflow {
            what: "string byte",
            count: entry.len(),
        })?;
        out.write_u16::<BigEndian>(len).expect("vec write");
        out.extend_from_slice(entry.as_bytes());
    }
    Ok(out)
}

fn encode_elements(bundle: &Bundle) -> Result<(Vec<u8>, u32), EncodeError> {
    let mut out = Vec::new();
    let mut property_total: u32 = 0;

    for element in &bundle.elements {
        let property_count =
            u16::try_from(element.properties.len()).map_err(|_| EncodeError::CountOverflow {
                what: "property",
                count: element.properties.len(),
            })?;
        let child_count =
            u16::try_from(element.children.len()).map_err(|_| EncodeError::CountOverflow {
                what: "child",
                count: element.children.len(),
            })?;
        property_total = property_total
            .checked_add(property_count as u32)
            .ok_or(EncodeError::CountOverflow {
                what: "property",
                count: usize::MAX,
            })?;

        for child in &element.children {
            if bundle.element(*child).is_none() {
                return Err(EncodeError::UnresolvedReference {
                    element: element.id,
                    child: *child,
                });
            }
        }

        out.write_u32::<BigEndian>(element.id).expect("vec write");
        out.write_u16::<BigEndian>(element.tag.to_wire()).expect("vec write");
        out.write_u16::<BigEndian>(element.name.unwrap_or(NO_NAME))
            .expect("vec write");
        out.write_u32::<BigEndian>(element.parent_id).expect("vec write");
        out.write_u16::<BigEndian>(property_count).expect("vec write");
        out.write_u16::<BigEndian>(child_count).expect("vec write");

        for property in &element.properties {
            let tag = property.value.tag();
            out.write_u16::<BigEndian>(property.name).expect("vec write");
            out.write_u8(tag.to_wire()).expect("vec write");
            out.write_u16::<BigEndian>(tag.value_len()).expect("vec write");
            encode_value(&mut out, &property.value);
        }

        for child in &element.children {
            out.write_u32::<BigEndian>(*child).expect("vec write");
        }
    }

    Ok((out, property_total))
}

fn encode_value(out: &mut Vec<u8>, value: &PropertyValue) {
    match value {
        PropertyValue::Str(index)
        | PropertyValue::Expression(index)
        | PropertyValue::Function(index) => {
            out.write_u16::<BigEndian>(*index).expect("vec write");
        }
        PropertyValue::Int(v) => out.write_i64::<BigEndian>(*v).expect("vec write"),
        PropertyValue::Float(v) => out.write_f64::<BigEndian>(*v).expect("vec write"),
        PropertyValue::Bool(v) => out.write_u8(*v as u8).expect("vec write"),
        PropertyValue::Color(v) | PropertyValue::Reference(v) => {
            out.write_u32::<BigEndian>(*v).expect("vec write");
        }
        PropertyValue::Size { width, height } => {
            out.write_f32::<BigEndian>(*width).expect("vec write");
            out.write_f32::<BigEndian>(*height).expect("vec write");
        }
        PropertyValue::Position { x, y } => {
            out.write_f32::<BigEndian>(*x).expect("vec write");
            out.write_f32::<BigEndian>(*y).expect("vec write");
        }
        PropertyValue::Margin(edges) | PropertyValue::Padding(edges) => {
            for edge in edges {
                out.write_f32::<BigEndian>(*edge).expect("vec write");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::{DecodeOptions, ElementRecord, ElementTag, PropertyRecord};
    use super::*;

    #[test]
    fn empty_bundle_is_header_only() {
        let bytes = encode(&Bundle::new()).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        let decoded = super::super::decode(&bytes, &DecodeOptions::default()).unwrap();
        assert!(decoded.elements.is_empty());
        assert!(decoded.strings.is_empty());
    }

    #[test]
    fn header_counts_match_arrays() {
        let mut bundle = Bundle::new();
        let name = bundle.add_string("visible").unwrap();
        bundle.add_element(ElementRecord {
            id: 1,
            tag: ElementTag::Button,
            name: None,
            parent_id: 0,
            properties: vec![
                PropertyRecord {
                    name,
                    value: PropertyValue::Bool(true),
                },
                PropertyRecord {
                    name,
                    value: PropertyValue::Int(3),
                },
            ],
            children: Vec::new(),
        });

        let bytes = encode(&bundle).unwrap();
        assert_eq!(&bytes[12..16], &1u32.to_be_bytes()); // elements
        assert_eq!(&bytes[16..20], &2u32.to_be_bytes()); // properties
    }

    #[test]
    fn unresolved_child_reference_fails() {
        let mut bundle = Bundle::new();
        bundle.add_element(ElementRecord {
            id: 1,
            tag: ElementTag::Container,
            name: None,
            parent_id: 0,
            properties: Vec::new(),
            children: vec![77],
        });
        assert!(matches!(
            encode(&bundle).unwrap_err(),
            EncodeError::UnresolvedReference { element: 1, child: 77 }
        ));
    }

    #[test]
    fn every_value_kind_round_trips() {
        let mut bundle = Bundle::new();
        let name = bundle.add_string("p").unwrap();
        let text = bundle.add_string("payload").unwrap();
        let values = vec![
            PropertyValue::Str(text),
            PropertyValue::Int(-42),
            PropertyValue::Float(2.5),
            PropertyValue::Bool(false),
            PropertyValue::Color(0x33CC99FF),
            PropertyValue::Size { width: 120.0, height: 40.0 },
            PropertyValue::Position { x: 4.0, y: 8.0 },
            PropertyValue::Margin([1.0, 2.0, 3.0, 4.0]),
            PropertyValue::Padding([4.0, 3.0, 2.0, 1.0]),
            PropertyValue::Reference(1),
            PropertyValue::Expression(text),
            PropertyValue::Function(text),
        ];
        bundle.add_element(ElementRecord {
            id: 1,
            tag: ElementTag::Container,
            name: None,
            parent_id: 0,
            properties: values
                .iter()
                .cloned()
                .map(|value| PropertyRecord { name, value })
                .collect(),
            children: Vec::new(),
        });

        let bytes = encode(&bundle).unwrap();
        let decoded = super::super::decode(&bytes, &DecodeOptions::default()).unwrap();
        let round: Vec<_> = decoded.elements[0]
            .properties
            .iter()
            .map(|p| p.value.clone())
            .collect();
        assert_eq!(round, values);
    }
}
