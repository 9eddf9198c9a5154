use std::fmt;

use serde::{Deserialize, Serialize};

use super::catalog::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Int,
    Float,
    Text,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Text => "text",
        };
        f.write_str(label)
    }
}

/// One raw argument as handed over by the upstream script reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Int(i32),
    Float(f32),
    Text(String),
}

impl ArgValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ArgValue::Int(_) => ParamKind::Int,
            ArgValue::Float(_) => ParamKind::Float,
            ArgValue::Text(_) => ParamKind::Text,
        }
    }

    pub(crate) fn placeholder(kind: ParamKind) -> Self {
        match kind {
            ParamKind::Int => ArgValue::Int(0),
            ParamKind::Float => ArgValue::Float(0.0),
            ParamKind::Text => ArgValue::Text(String::new()),
        }
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        ArgValue::Int(value)
    }
}

impl From<f32> for ArgValue {
    fn from(value: f32) -> Self {
        ArgValue::Float(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Text(value)
    }
}

/// Sequential reader over an opcode's raw arguments.
///
/// Constructors read their fields in declaration order; every read is checked
/// against the argument actually present at that position.
pub struct ArgCursor<'a> {
    opcode: u32,
    args: &'a [ArgValue],
    position: usize,
}

impl<'a> ArgCursor<'a> {
    pub(crate) fn new(opcode: u32, args: &'a [ArgValue]) -> Self {
        Self {
            opcode,
            args,
            position: 0,
        }
    }

    pub fn int(&mut self) -> Result<i32, DecodeError> {
        match self.next(ParamKind::Int)? {
            ArgValue::Int(value) => Ok(*value),
            other => Err(self.mismatch(ParamKind::Int, other)),
        }
    }

    pub fn float(&mut self) -> Result<f32, DecodeError> {
        match self.next(ParamKind::Float)? {
            ArgValue::Float(value) => Ok(*value),
            other => Err(self.mismatch(ParamKind::Float, other)),
        }
    }

    pub fn text(&mut self) -> Result<String, DecodeError> {
        match self.next(ParamKind::Text)? {
            ArgValue::Text(value) => Ok(value.clone()),
            other => Err(self.mismatch(ParamKind::Text, other)),
        }
    }

    pub(crate) fn consumed(&self) -> usize {
        self.position
    }

    fn next(&mut self, wanted: ParamKind) -> Result<&'a ArgValue, DecodeError> {
        let Some(value) = self.args.get(self.position) else {
            return Err(DecodeError::ArgumentsExhausted {
                opcode: self.opcode,
                index: self.position,
                expected: wanted,
            });
        };
        self.position += 1;
        Ok(value)
    }

    fn mismatch(&self, expected: ParamKind, actual: &ArgValue) -> DecodeError {
        DecodeError::TypeMismatch {
            opcode: self.opcode,
            index: self.position - 1,
            expected,
            actual: actual.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_maps_to_matching_kinds() {
        let decoded: Vec<ArgValue> =
            serde_json::from_str(r#"[3, 2.5, "door"]"#).expect("deserialize");
        assert_eq!(
            decoded,
            vec![
                ArgValue::Int(3),
                ArgValue::Float(2.5),
                ArgValue::Text("door".to_string())
            ]
        );
    }

    #[test]
    fn cursor_reports_position_of_wrong_kind() {
        let args = vec![ArgValue::Int(1), ArgValue::Int(2)];
        let mut cursor = ArgCursor::new(86, &args);
        assert_eq!(cursor.int().expect("first"), 1);
        let error = cursor.text().expect_err("second is not text");
        assert_eq!(
            error,
            DecodeError::TypeMismatch {
                opcode: 86,
                index: 1,
                expected: ParamKind::Text,
                actual: ParamKind::Int,
            }
        );
    }

    #[test]
    fn cursor_reports_exhaustion() {
        let mut cursor = ArgCursor::new(62, &[]);
        assert!(matches!(
            cursor.text(),
            Err(DecodeError::ArgumentsExhausted { index: 0, .. })
        ));
    }
}
