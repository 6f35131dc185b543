pub const OVERWRITE_ORIGINAL: &str = "-overwrite_original";

/// Insertion-ordered `(key, value)` pairs. Duplicate keys are kept.
pub type FieldMap = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItem {
    Literal(String),
    Map(FieldMap),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataInput {
    Map(FieldMap),
    List(Vec<ListItem>),
}

impl MetadataInput {
    pub fn map<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        MetadataInput::Map(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// One entry of a normalized write request; `value == None` is a positional
/// token passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub field: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltArgs {
    pub tokens: Vec<String>,
    pub fields: Vec<(String, String)>,
}

pub struct ArgumentBuilder;

impl ArgumentBuilder {
    pub fn build(input: &MetadataInput) -> BuiltArgs {
        let assignments = Self::assignments(input);
        let tokens = assignments.iter().flat_map(Self::tokens).collect();
        let fields = assignments
            .into_iter()
            .filter_map(|assignment| assignment.value.map(|value| (assignment.field, value)))
            .collect();
        BuiltArgs { tokens, fields }
    }

    pub fn assignments(input: &MetadataInput) -> Vec<Assignment> {
        match input {
            MetadataInput::Map(pairs) => pairs
                .iter()
                .map(|(key, value)| Assignment {
                    field: key.clone(),
                    value: Some(value.clone()),
                })
                .collect(),
            MetadataInput::List(items) => items
                .iter()
                .flat_map(|item| match item {
                    ListItem::Literal(literal) => vec![Assignment {
                        field: literal.clone(),
                        value: None,
                    }],
                    ListItem::Map(pairs) => pairs
                        .iter()
                        .map(|(key, value)| {
                            if is_positional(key) {
                                Assignment {
                                    field: value.clone(),
                                    value: None,
                                }
                            } else {
                                Assignment {
                                    field: key.clone(),
                                    value: Some(value.clone()),
                                }
                            }
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn single(field: &str, value: &str, overwrite_original: bool) -> Vec<String> {
        let mut tokens = vec![Self::field_token(field, value)];
        if overwrite_original {
            tokens.push(OVERWRITE_ORIGINAL.to_string());
        }
        tokens
    }

    /// One argv entry; the tool is spawned without a shell, so the value is
    /// passed as-is.
    pub fn field_token(field: &str, value: &str) -> String {
        format!("-{field}={value}")
    }

    fn tokens(assignment: &Assignment) -> Vec<String> {
        match &assignment.value {
            Some(value) => vec![Self::field_token(&assignment.field, value)],
            None => split_literal(&assignment.field),
        }
    }
}

/// Splits a passthrough string such as `-charset filename=utf8` into argv
/// entries with shell word rules. Unbalanced quotes keep the string whole.
fn split_literal(literal: &str) -> Vec<String> {
    match shlex::split(literal) {
        Some(parts) if !parts.is_empty() => parts,
        _ => vec![literal.to_string()],
    }
}

fn is_positional(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|ch| ch.is_ascii_digit())
}
