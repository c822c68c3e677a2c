//! CSS-like selector parsing for element queries.
//!
//! Supports:
//! - `"canvas"` - by tag name
//! - `"*"` - any element
//! - `"#map"` - by `id` attribute
//! - `".leaflet-widgets"` - by class
//! - `"[data-model-id='abc']"`, `"[hidden]"` - by attribute value or presence
//! - `"div.leaflet-widgets"` - compound selectors
//! - `".jupyter-threejs canvas"` - descendant combinator
//! - `"div > canvas"` - child combinator

use crate::dom::Element;

/// Parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Match any element
    Universal,
    /// Match by tag name
    Type(String),
    /// Match by ID (e.g., `#my-id`)
    Id(String),
    /// Match by class (e.g., `.my-class`)
    Class(String),
    /// Match by attribute; `None` matches on presence alone
    Attribute { name: String, value: Option<String> },
    /// All parts must match the same element (e.g., `div.map`)
    Compound(Vec<Selector>),
    /// Descendant combinator (e.g., `.scene canvas`)
    Descendant(Box<Selector>, Box<Selector>),
    /// Child combinator (e.g., `div > canvas`)
    Child(Box<Selector>, Box<Selector>),
}

impl Selector {
    /// Parse a selector string.
    ///
    /// # Errors
    ///
    /// Returns an error if the selector is invalid.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        SelectorParser::new(input).parse()
    }

    /// Check if this selector matches an element.
    ///
    /// Combinators look at the element's real ancestors, which may lie
    /// outside the subtree a query started from.
    #[must_use]
    pub fn matches(&self, element: &Element) -> bool {
        match self {
            Self::Universal => true,
            Self::Type(name) => element.tag().eq_ignore_ascii_case(name),
            Self::Id(id) => element.attribute("id").as_deref() == Some(id.as_str()),
            Self::Class(class) => element.has_class(class),
            Self::Attribute { name, value } => match (element.attribute(name), value) {
                (Some(actual), Some(expected)) => actual == *expected,
                (Some(_), None) => true,
                (None, _) => false,
            },
            Self::Compound(parts) => parts.iter().all(|part| part.matches(element)),
            Self::Descendant(ancestor, subject) => {
                subject.matches(element) && element.ancestors().any(|a| ancestor.matches(&a))
            }
            Self::Child(parent, subject) => {
                subject.matches(element) && element.parent().is_some_and(|p| parent.matches(&p))
            }
        }
    }
}

/// Selector parser.
pub struct SelectorParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> SelectorParser<'a> {
    /// Create a new parser.
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Parse the selector.
    pub fn parse(&mut self) -> Result<Selector, SelectorError> {
        self.skip_whitespace();

        if self.peek_char().is_none() {
            return Err(SelectorError::Empty);
        }

        let mut selector = self.parse_compound()?;
        loop {
            let had_whitespace = self.skip_whitespace();
            match self.peek_char() {
                None => return Ok(selector),
                Some('>') => {
                    self.advance();
                    self.skip_whitespace();
                    if self.peek_char().is_none() {
                        return Err(SelectorError::DanglingCombinator);
                    }
                    let subject = self.parse_compound()?;
                    selector = Selector::Child(Box::new(selector), Box::new(subject));
                }
                Some(_) if had_whitespace => {
                    let subject = self.parse_compound()?;
                    selector = Selector::Descendant(Box::new(selector), Box::new(subject));
                }
                Some(c) => return Err(SelectorError::UnexpectedChar(c)),
            }
        }
    }

    fn parse_compound(&mut self) -> Result<Selector, SelectorError> {
        let mut parts = Vec::new();

        while let Some(c) = self.peek_char() {
            let part = match c {
                '*' if parts.is_empty() => {
                    self.advance();
                    Selector::Universal
                }
                '#' => self.parse_id()?,
                '.' => self.parse_class()?,
                '[' => self.parse_attribute()?,
                _ if parts.is_empty() && c.is_alphabetic() => self.parse_type()?,
                _ if c.is_whitespace() || c == '>' => break,
                _ => return Err(SelectorError::UnexpectedChar(c)),
            };
            parts.push(part);
        }

        match parts.len() {
            0 => Err(self
                .peek_char()
                .map_or(SelectorError::Empty, SelectorError::UnexpectedChar)),
            1 => Ok(parts.remove(0)),
            _ => Ok(Selector::Compound(parts)),
        }
    }

    fn parse_id(&mut self) -> Result<Selector, SelectorError> {
        self.advance(); // Skip '#'
        let id = self.read_identifier()?;
        Ok(Selector::Id(id))
    }

    fn parse_class(&mut self) -> Result<Selector, SelectorError> {
        self.advance(); // Skip '.'
        let class = self.read_identifier()?;
        Ok(Selector::Class(class))
    }

    fn parse_type(&mut self) -> Result<Selector, SelectorError> {
        let name = self.read_identifier()?;
        Ok(Selector::Type(name))
    }

    fn parse_attribute(&mut self) -> Result<Selector, SelectorError> {
        self.advance(); // Skip '['

        let name = self
            .read_identifier()
            .map_err(|_| SelectorError::InvalidAttribute)?;

        match self.peek_char() {
            Some(']') => {
                self.advance();
                return Ok(Selector::Attribute { name, value: None });
            }
            Some('=') => self.advance(),
            Some(_) => return Err(SelectorError::InvalidAttribute),
            None => return Err(SelectorError::UnclosedAttribute),
        }

        let value = match self.peek_char() {
            Some(quote @ ('\'' | '"')) => {
                self.advance();
                let value = self.read_until_any(&[quote]);
                if self.peek_char() != Some(quote) {
                    return Err(SelectorError::UnclosedAttribute);
                }
                self.advance();
                value
            }
            _ => self.read_until_any(&[']']),
        };

        if self.peek_char() != Some(']') {
            return Err(SelectorError::UnclosedAttribute);
        }
        self.advance();

        Ok(Selector::Attribute {
            name,
            value: Some(value),
        })
    }

    fn read_identifier(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        if self.pos == start {
            return Err(SelectorError::ExpectedIdentifier);
        }

        Ok(self.input[start..self.pos].to_string())
    }

    fn read_until_any(&mut self, stops: &[char]) -> String {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if stops.contains(&c) {
                break;
            }
            self.advance();
        }
        self.input[start..self.pos].to_string()
    }

    /// Returns whether any whitespace was skipped.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
        self.pos != start
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }
}

/// Selector parsing error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    /// Empty selector
    #[error("empty selector")]
    Empty,
    /// Unexpected character
    #[error("unexpected character: '{0}'")]
    UnexpectedChar(char),
    /// Expected identifier
    #[error("expected identifier")]
    ExpectedIdentifier,
    /// Invalid attribute syntax
    #[error("invalid attribute syntax")]
    InvalidAttribute,
    /// Unclosed attribute bracket
    #[error("unclosed attribute bracket")]
    UnclosedAttribute,
    /// Combinator without a right-hand side
    #[error("combinator is missing its right-hand selector")]
    DanglingCombinator,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn class(name: &str) -> Box<Selector> {
        Box::new(Selector::Class(name.to_string()))
    }

    #[test]
    fn test_parse_type() {
        let sel = Selector::parse("canvas").unwrap();
        assert_eq!(sel, Selector::Type("canvas".to_string()));
    }

    #[test]
    fn test_parse_id() {
        let sel = Selector::parse("#map-1").unwrap();
        assert_eq!(sel, Selector::Id("map-1".to_string()));
    }

    #[test]
    fn test_parse_class() {
        let sel = Selector::parse(".leaflet-widgets").unwrap();
        assert_eq!(sel, Selector::Class("leaflet-widgets".to_string()));
    }

    #[test]
    fn test_parse_universal() {
        assert_eq!(Selector::parse("*").unwrap(), Selector::Universal);
    }

    #[test]
    fn test_parse_attribute_quoted() {
        for input in ["[data-model-id='abc']", "[data-model-id=\"abc\"]"] {
            assert_eq!(
                Selector::parse(input).unwrap(),
                Selector::Attribute {
                    name: "data-model-id".to_string(),
                    value: Some("abc".to_string()),
                }
            );
        }
    }

    #[test]
    fn test_parse_attribute_unquoted_and_presence() {
        assert_eq!(
            Selector::parse("[width=400]").unwrap(),
            Selector::Attribute {
                name: "width".to_string(),
                value: Some("400".to_string()),
            }
        );
        assert_eq!(
            Selector::parse("[hidden]").unwrap(),
            Selector::Attribute {
                name: "hidden".to_string(),
                value: None,
            }
        );
    }

    #[test]
    fn test_parse_attribute_value_with_spaces_and_unicode() {
        assert_eq!(
            Selector::parse("[aria-label='地図 👋']").unwrap(),
            Selector::Attribute {
                name: "aria-label".to_string(),
                value: Some("地図 👋".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_compound() {
        let sel = Selector::parse("div.leaflet-widgets[data-zoom]").unwrap();
        assert_eq!(
            sel,
            Selector::Compound(vec![
                Selector::Type("div".to_string()),
                Selector::Class("leaflet-widgets".to_string()),
                Selector::Attribute {
                    name: "data-zoom".to_string(),
                    value: None,
                },
            ])
        );
    }

    #[test]
    fn test_parse_descendant() {
        let sel = Selector::parse(".jupyter-threejs canvas").unwrap();
        assert_eq!(
            sel,
            Selector::Descendant(
                class("jupyter-threejs"),
                Box::new(Selector::Type("canvas".to_string()))
            )
        );
    }

    #[test]
    fn test_parse_child_is_left_associative() {
        let sel = Selector::parse(".a .b > .c").unwrap();
        assert_eq!(
            sel,
            Selector::Child(
                Box::new(Selector::Descendant(class("a"), class("b"))),
                class("c")
            )
        );
    }

    #[test]
    fn test_parse_child_without_spaces() {
        let sel = Selector::parse(".a>.b").unwrap();
        assert_eq!(sel, Selector::Child(class("a"), class("b")));
    }

    #[test]
    fn test_parse_whitespace() {
        let sel = Selector::parse("  canvas  ").unwrap();
        assert_eq!(sel, Selector::Type("canvas".to_string()));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Selector::parse(""), Err(SelectorError::Empty));
        assert_eq!(Selector::parse("   "), Err(SelectorError::Empty));
        assert_eq!(
            Selector::parse("@invalid"),
            Err(SelectorError::UnexpectedChar('@'))
        );
        assert_eq!(Selector::parse("#"), Err(SelectorError::ExpectedIdentifier));
        assert_eq!(Selector::parse("."), Err(SelectorError::ExpectedIdentifier));
        assert_eq!(
            Selector::parse("[data-x='foo'"),
            Err(SelectorError::UnclosedAttribute)
        );
        assert_eq!(Selector::parse("[='x']"), Err(SelectorError::InvalidAttribute));
        assert_eq!(Selector::parse("div >"), Err(SelectorError::DanglingCombinator));
        assert!(Selector::parse("*invalid").is_err());
        assert!(Selector::parse("div > > a").is_err());
    }

    #[test]
    fn test_selector_error_display() {
        assert_eq!(SelectorError::Empty.to_string(), "empty selector");
        assert_eq!(
            SelectorError::UnexpectedChar('@').to_string(),
            "unexpected character: '@'"
        );
        assert_eq!(
            SelectorError::UnclosedAttribute.to_string(),
            "unclosed attribute bracket"
        );
    }

    // =========================================================================
    // Matching
    // =========================================================================

    fn scene() -> (Element, Element, Element) {
        let root = Element::new("div");
        root.add_class("jupyter-threejs");
        root.set_attribute("id", "scene");
        let wrapper = Element::new("div");
        let canvas = Element::new("canvas");
        canvas.set_attribute("width", "400");
        root.append_child(&wrapper).unwrap();
        wrapper.append_child(&canvas).unwrap();
        (root, wrapper, canvas)
    }

    #[test]
    fn test_match_simple() {
        let (root, _, canvas) = scene();
        assert!(Selector::parse("canvas").unwrap().matches(&canvas));
        assert!(Selector::parse("CANVAS").unwrap().matches(&canvas));
        assert!(Selector::parse("#scene").unwrap().matches(&root));
        assert!(Selector::parse(".jupyter-threejs").unwrap().matches(&root));
        assert!(Selector::parse("[width='400']").unwrap().matches(&canvas));
        assert!(!Selector::parse("[width='300']").unwrap().matches(&canvas));
        assert!(Selector::parse("[width]").unwrap().matches(&canvas));
        assert!(Selector::parse("*").unwrap().matches(&canvas));
    }

    #[test]
    fn test_match_descendant_and_child() {
        let (root, wrapper, canvas) = scene();
        let descendant = Selector::parse(".jupyter-threejs canvas").unwrap();
        assert!(descendant.matches(&canvas));
        assert!(!descendant.matches(&wrapper));

        let child = Selector::parse(".jupyter-threejs > canvas").unwrap();
        assert!(!child.matches(&canvas));
        assert!(Selector::parse(".jupyter-threejs > div").unwrap().matches(&wrapper));

        assert_eq!(root.query_selector_all("div canvas").unwrap(), vec![canvas]);
    }

    #[test]
    fn test_match_compound() {
        let (root, wrapper, _) = scene();
        let sel = Selector::parse("div.jupyter-threejs").unwrap();
        assert!(sel.matches(&root));
        assert!(!sel.matches(&wrapper));
    }

    proptest! {
        #[test]
        fn prop_class_selector_roundtrip(name in "[a-z][a-z0-9_-]{0,16}") {
            let sel = Selector::parse(&format!(".{name}")).unwrap();
            prop_assert_eq!(sel, Selector::Class(name.clone()));

            let element = Element::new("div");
            element.add_class(&name);
            let compound = format!("div.{name}");
            prop_assert!(Selector::parse(&compound).unwrap().matches(&element));
        }

        #[test]
        fn prop_parse_never_panics(input in "\\PC{0,24}") {
            let _ = Selector::parse(&input);
        }
    }
}
