use std::collections::HashMap;

use crate::model::Object;
use crate::parser::ObjectParser;

/// One content-stream operation: the operator keyword plus the operands
/// that preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operator: String,
    pub operands: Vec<Object>,
}

pub struct ContentStreamParser<'a> {
    parser: ObjectParser<'a>,
}

impl<'a> ContentStreamParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            parser: ObjectParser::from_bytes(data),
        }
    }

    /// Accumulates operand objects until an operator keyword shows up.
    /// Inline images come back as a `BI` operation carrying the image
    /// dictionary; their binary payload is skipped. Malformed constructs
    /// drop the pending operands and scanning continues.
    pub fn next_operation(&mut self) -> Option<Operation> {
        let mut operands = Vec::new();
        loop {
            match self.parser.read_object() {
                Ok(Some(Object::Keyword(operator))) => {
                    if operator == "BI" {
                        return Some(self.read_inline_image());
                    }
                    return Some(Operation { operator, operands });
                }
                Ok(Some(obj)) => operands.push(obj),
                Ok(None) => return None,
                Err(_) => operands.clear(),
            }
        }
    }

    fn read_inline_image(&mut self) -> Operation {
        let mut dict = HashMap::new();
        loop {
            match self.parser.read_object() {
                Ok(Some(Object::Keyword(kw))) if kw == "ID" => break,
                Ok(Some(Object::Name(key))) => match self.parser.read_object() {
                    Ok(Some(value)) => {
                        dict.insert(key, value);
                    }
                    _ => break,
                },
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        self.parser.lexer_mut().skip_inline_image_data();
        Operation {
            operator: "BI".to_string(),
            operands: vec![Object::Dictionary(dict)],
        }
    }
}

impl Iterator for ContentStreamParser<'_> {
    type Item = Operation;
    fn next(&mut self) -> Option<Self::Item> {
        self.next_operation()
    }
}
