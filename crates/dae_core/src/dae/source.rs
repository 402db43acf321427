//! `<source>` reader: typed data arrays with their accessor layout.
//!
//! A source holds one data array (`float_array`, `Name_array` or
//! `IDREF_array`) and a `technique_common/accessor` describing how many
//! elements it has (`count`) and how many scalars make up one element
//! (`stride`).
//!
//! Float arrays with a stride of 16 are read as 4x4 matrices. COLLADA has
//! no separate matrix array tag, so this is a heuristic: a plain float
//! source that happens to use 16 components per element is misclassified.

use dae_math::{Mat4, Mat4Ext};

use super::error::{ParseError, ParseResult};
use super::xml::{self, XmlNode};

/// Stride that selects the matrix interpretation of a float array.
pub const MATRIX_STRIDE: usize = 16;

/// Element storage of a typed array.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    /// Plain scalars, `count * stride` of them
    Float(Vec<f32>),

    /// Names or id references, `count * stride` of them
    Name(Vec<String>),

    /// One matrix per element (stride 16)
    Matrix(Vec<Mat4>),
}

/// A parsed data array with its accessor layout.
#[derive(Clone, Debug, PartialEq)]
pub struct TypedArray {
    /// Number of logical elements
    pub count: usize,

    /// Scalars per logical element
    pub stride: usize,

    /// Parsed values in document order
    pub data: ArrayData,
}

impl TypedArray {
    /// Number of stored values: scalars, names, or matrices.
    pub fn len(&self) -> usize {
        match &self.data {
            ArrayData::Float(values) => values.len(),
            ArrayData::Name(values) => values.len(),
            ArrayData::Matrix(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn floats(&self) -> Option<&[f32]> {
        match &self.data {
            ArrayData::Float(values) => Some(values),
            _ => None,
        }
    }

    pub fn names(&self) -> Option<&[String]> {
        match &self.data {
            ArrayData::Name(values) => Some(values),
            _ => None,
        }
    }

    pub fn matrices(&self) -> Option<&[Mat4]> {
        match &self.data {
            ArrayData::Matrix(values) => Some(values),
            _ => None,
        }
    }

    /// Human readable element kind, used in dumps and error messages.
    pub fn kind_name(&self) -> &'static str {
        match &self.data {
            ArrayData::Float(_) => "float",
            ArrayData::Name(_) => "name",
            ArrayData::Matrix(_) => "float4x4",
        }
    }

    /// Encode the values back into COLLADA array text.
    ///
    /// Floats use the shortest representation that reads back to the same
    /// bits; matrices are written row-major.
    pub fn encode_text(&self) -> String {
        match &self.data {
            ArrayData::Float(values) => join(values.iter()),
            ArrayData::Name(values) => values.join(" "),
            ArrayData::Matrix(values) => join(values.iter().flat_map(|m| m.to_row_major())),
        }
    }
}

fn join<T: ToString>(values: impl Iterator<Item = T>) -> String {
    values.map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

/// A `<source>` element: an id and its typed array.
#[derive(Clone, Debug, PartialEq)]
pub struct Source {
    pub id: String,
    pub array: TypedArray,
}

impl Source {
    /// Float data, or an error naming this source when it holds something else.
    pub fn expect_floats(&self) -> ParseResult<&[f32]> {
        self.array.floats().ok_or_else(|| self.wrong_kind("float"))
    }

    pub fn expect_names(&self) -> ParseResult<&[String]> {
        self.array.names().ok_or_else(|| self.wrong_kind("name"))
    }

    pub fn expect_matrices(&self) -> ParseResult<&[Mat4]> {
        self.array.matrices().ok_or_else(|| self.wrong_kind("float4x4"))
    }

    fn wrong_kind(&self, wanted: &str) -> ParseError {
        ParseError::malformed(format!(
            "source '{}' holds {} data, expected {}",
            self.id,
            self.array.kind_name(),
            wanted
        ))
    }
}

/// Parse a `<source>` element.
pub fn parse_source(node: XmlNode<'_, '_>) -> ParseResult<Source> {
    xml::expect_tag(node, "source")?;
    let id = xml::required_attribute(node, "id")?.to_string();

    let technique = xml::required_child(node, "technique_common")?;
    let accessor = xml::required_child(technique, "accessor")?;
    let count: usize = xml::required_parsed_attribute(accessor, "count")?;
    let stride: usize = xml::parse_attribute(accessor, "stride")?.unwrap_or(1);
    if stride == 0 {
        return Err(ParseError::malformed(format!(
            "source '{}' declares a zero stride",
            id
        )));
    }
    let expected = count.checked_mul(stride).ok_or_else(|| {
        ParseError::malformed(format!(
            "source '{}': count {} with stride {} overflows",
            id, count, stride
        ))
    })?;

    let data = if let Some(array) = xml::child(node, "float_array") {
        let values: Vec<f32> = xml::parse_list_exact(array, expected)?;
        if stride == MATRIX_STRIDE {
            ArrayData::Matrix(
                values
                    .chunks_exact(MATRIX_STRIDE)
                    .filter_map(Mat4::try_from_row_major_slice)
                    .collect(),
            )
        } else {
            ArrayData::Float(values)
        }
    } else if let Some(array) = xml::child(node, "Name_array").or_else(|| xml::child(node, "IDREF_array")) {
        ArrayData::Name(xml::parse_list_exact(array, expected)?)
    } else {
        return Err(ParseError::malformed(format!(
            "source '{}' has no float_array, Name_array or IDREF_array",
            id
        )));
    };

    let array = TypedArray {
        count,
        stride,
        data,
    };
    log::trace!("source '{}': {} x {} ({})", id, count, stride, array.kind_name());

    Ok(Source { id, array })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml_text: &str) -> ParseResult<Source> {
        let doc = roxmltree::Document::parse(xml_text).unwrap();
        parse_source(doc.root_element())
    }

    #[test]
    fn test_parse_float_source() {
        let source = parse(
            r##"<source id="Cube-positions">
                <float_array id="Cube-positions-array" count="6">0 0 0 1 0.5 -2</float_array>
                <technique_common>
                    <accessor source="#Cube-positions-array" count="2" stride="3"/>
                </technique_common>
            </source>"##,
        )
        .unwrap();

        assert_eq!(source.id, "Cube-positions");
        assert_eq!(source.array.count, 2);
        assert_eq!(source.array.stride, 3);
        assert_eq!(source.array.len(), 6);
        assert_eq!(source.array.floats().unwrap()[5], -2.0);
    }

    #[test]
    fn test_parse_name_source_defaults_stride() {
        let source = parse(
            r#"<source id="Skin-joints">
                <Name_array count="3">Root Spine Head</Name_array>
                <technique_common><accessor count="3"/></technique_common>
            </source>"#,
        )
        .unwrap();

        assert_eq!(source.array.stride, 1);
        assert_eq!(source.expect_names().unwrap(), ["Root", "Spine", "Head"]);
    }

    #[test]
    fn test_stride_sixteen_reads_matrices() {
        let source = parse(
            r#"<source id="Skin-bind_poses">
                <float_array count="32">
                    1 0 0 4  0 1 0 5  0 0 1 6  0 0 0 1
                    2 0 0 0  0 2 0 0  0 0 2 0  0 0 0 1
                </float_array>
                <technique_common><accessor count="2" stride="16"/></technique_common>
            </source>"#,
        )
        .unwrap();

        let matrices = source.expect_matrices().unwrap();
        assert_eq!(matrices.len(), 2);
        assert_eq!(source.array.len(), source.array.count);
        let moved = matrices[0].transform_point3(dae_math::Vec3::ZERO);
        assert!((moved - dae_math::Vec3::new(4.0, 5.0, 6.0)).length() < 0.001);
    }

    #[test]
    fn test_token_count_must_match_accessor() {
        let result = parse(
            r#"<source id="short">
                <float_array count="5">0 1 2 3 4</float_array>
                <technique_common><accessor count="2" stride="3"/></technique_common>
            </source>"#,
        );
        assert!(matches!(result, Err(ParseError::MalformedDocument(_))));
    }

    #[test]
    fn test_oversized_accessor_is_malformed() {
        let result = parse(
            r#"<source id="huge">
                <float_array count="0"></float_array>
                <technique_common><accessor count="9223372036854775808" stride="2"/></technique_common>
            </source>"#,
        );
        assert!(matches!(result, Err(ParseError::MalformedDocument(_))));
    }

    #[test]
    fn test_missing_accessor_is_malformed() {
        let result = parse(r#"<source id="x"><float_array count="1">0</float_array></source>"#);
        assert!(matches!(result, Err(ParseError::MalformedDocument(_))));
    }

    #[test]
    fn test_missing_array_is_malformed() {
        let result = parse(
            r#"<source id="x"><technique_common><accessor count="1"/></technique_common></source>"#,
        );
        assert!(matches!(result, Err(ParseError::MalformedDocument(_))));
    }

    #[test]
    fn test_matrix_text_reparses_bit_identical() {
        let originals = vec![
            Mat4::from_cols_array(&std::array::from_fn(|i| (i as f32 + 0.1) / 3.0)),
            Mat4::from_rotation_y(0.7) * Mat4::from_translation(dae_math::Vec3::new(1e-7, -3.25, 1e6)),
        ];
        let array = TypedArray {
            count: originals.len(),
            stride: MATRIX_STRIDE,
            data: ArrayData::Matrix(originals.clone()),
        };

        let xml_text = format!(
            r#"<source id="m"><float_array count="32">{}</float_array>
               <technique_common><accessor count="2" stride="16"/></technique_common></source>"#,
            array.encode_text()
        );
        let reparsed = parse(&xml_text).unwrap();
        let matrices = reparsed.expect_matrices().unwrap();

        for (a, b) in originals.iter().zip(matrices) {
            let a_bits: Vec<u32> = a.to_cols_array().iter().map(|f| f.to_bits()).collect();
            let b_bits: Vec<u32> = b.to_cols_array().iter().map(|f| f.to_bits()).collect();
            assert_eq!(a_bits, b_bits);
        }
    }
}
