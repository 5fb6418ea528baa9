//! Prompt templates with named placeholders.
//!
//! Placeholders are written `{name}`; literal braces are written `{{` and
//! `}}`. Rendering fails with [`PromptError::MissingVariable`] if any
//! placeholder has no value. Nothing is ever truncated here: oversize
//! prompts are the model provider's to reject.
//!
//! ```rust
//! use std::collections::HashMap;
//! use rag_agent_core::prompt::PromptTemplate;
//!
//! let t = PromptTemplate::parse("Context: {context}\nQuestion: {question}").unwrap();
//! let mut vars = HashMap::new();
//! vars.insert("context", "Owls are allowed.".to_string());
//! vars.insert("question", "Can I bring an owl?".to_string());
//! assert_eq!(t.render(&vars).unwrap(), "Context: Owls are allowed.\nQuestion: Can I bring an owl?");
//! ```

use std::collections::HashMap;

use crate::error::PromptError;
use crate::models::{Message, RetrievalResult, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A parsed single-string template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn parse(source: &str) -> Result<Self, PromptError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) if ch.is_alphanumeric() || ch == '_' => name.push(ch),
                            Some(ch) => {
                                return Err(PromptError::Malformed(format!(
                                    "invalid character '{}' in placeholder",
                                    ch
                                )))
                            }
                            None => {
                                return Err(PromptError::Malformed(
                                    "unclosed placeholder".to_string(),
                                ))
                            }
                        }
                    }
                    if name.is_empty() {
                        return Err(PromptError::Malformed("empty placeholder".to_string()));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Variable(name));
                }
                '}' => {
                    return Err(PromptError::Malformed(
                        "unmatched '}' (use '}}' for a literal brace)".to_string(),
                    ))
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Placeholder names in order of first appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for s in &self.segments {
            if let Segment::Variable(name) = s {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    pub fn render(&self, values: &HashMap<&str, String>) -> Result<String, PromptError> {
        let mut out = String::new();
        for s in &self.segments {
            match s {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) => {
                    let value = values
                        .get(name.as_str())
                        .ok_or_else(|| PromptError::MissingVariable(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// A sequence of role-tagged templates rendered into chat messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPromptTemplate {
    parts: Vec<(Role, PromptTemplate)>,
}

impl ChatPromptTemplate {
    pub fn from_messages(parts: &[(Role, &str)]) -> Result<Self, PromptError> {
        let parts = parts
            .iter()
            .map(|(role, text)| Ok((*role, PromptTemplate::parse(text)?)))
            .collect::<Result<Vec<_>, PromptError>>()?;
        Ok(Self { parts })
    }

    /// A single user message built from `template`.
    pub fn from_template(template: &str) -> Result<Self, PromptError> {
        Self::from_messages(&[(Role::User, template)])
    }

    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (_, t) in &self.parts {
            for v in t.variables() {
                if !names.contains(&v) {
                    names.push(v);
                }
            }
        }
        names
    }

    pub fn render(&self, values: &HashMap<&str, String>) -> Result<Vec<Message>, PromptError> {
        self.parts
            .iter()
            .map(|(role, template)| {
                let content = template.render(values)?;
                Ok(match role {
                    Role::System => Message::system(content),
                    Role::Assistant => Message::assistant(content),
                    Role::User | Role::Tool => Message::user(content),
                })
            })
            .collect()
    }
}

/// Default template for answering from retrieved context.
pub const RAG_TEMPLATE: &str = "You are an assistant answering questions about a collection of documents.\n\
Use ONLY the context below to answer the question.\n\
If the answer is not in the context, say clearly that you do not know.\n\n\
Context:\n{context}\n\n\
Question: {question}\n\n\
Answer:";

/// Render retrieval hits as `[Source: <file>]` blocks separated by `---`.
pub fn format_context(result: &RetrievalResult) -> String {
    result
        .iter()
        .map(|hit| {
            let name = hit
                .chunk
                .source
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(&hit.chunk.source);
            format!("[Source: {}]\n{}", name, hit.chunk.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoredChunk;
    use crate::testing::chunk;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_render_substitutes_all() {
        let t = PromptTemplate::parse("{a} and {b} and {a}").unwrap();
        assert_eq!(t.variables(), vec!["a", "b"]);
        assert_eq!(t.render(&vars(&[("a", "x"), ("b", "y")])).unwrap(), "x and y and x");
    }

    #[test]
    fn test_missing_variable_fails() {
        let t = PromptTemplate::parse("Context: {context} Q: {question}").unwrap();
        let err = t.render(&vars(&[("context", "c")])).unwrap_err();
        assert_eq!(err, PromptError::MissingVariable("question".to_string()));
    }

    #[test]
    fn test_escaped_braces() {
        let t = PromptTemplate::parse(r#"Return {{"labels": [...]}} for {topic}"#).unwrap();
        assert_eq!(
            t.render(&vars(&[("topic", "sales")])).unwrap(),
            r#"Return {"labels": [...]} for sales"#
        );
    }

    #[test]
    fn test_malformed_templates() {
        assert!(matches!(PromptTemplate::parse("{open"), Err(PromptError::Malformed(_))));
        assert!(matches!(PromptTemplate::parse("{}"), Err(PromptError::Malformed(_))));
        assert!(matches!(PromptTemplate::parse("a } b"), Err(PromptError::Malformed(_))));
        assert!(matches!(PromptTemplate::parse("{a b}"), Err(PromptError::Malformed(_))));
    }

    #[test]
    fn test_value_not_truncated() {
        let t = PromptTemplate::parse("{big}").unwrap();
        let big = "x".repeat(100_000);
        assert_eq!(t.render(&vars(&[("big", big.as_str())])).unwrap().len(), 100_000);
    }

    #[test]
    fn test_chat_template_roles() {
        let t = ChatPromptTemplate::from_messages(&[
            (Role::System, "You explain {topic} simply."),
            (Role::User, "{question}"),
        ])
        .unwrap();
        assert_eq!(t.variables(), vec!["topic", "question"]);
        let messages = t
            .render(&vars(&[("topic", "Rust"), ("question", "What is ownership?")]))
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "You explain Rust simply.");
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn test_rag_template_placeholders() {
        let t = ChatPromptTemplate::from_template(RAG_TEMPLATE).unwrap();
        assert_eq!(t.variables(), vec!["context", "question"]);
    }

    #[test]
    fn test_format_context() {
        let result = RetrievalResult {
            hits: vec![
                ScoredChunk { chunk: chunk("docs/rules.md", 0, "No dragons."), score: 0.9 },
                ScoredChunk { chunk: chunk("menu.md", 0, "Pumpkin juice."), score: 0.5 },
            ],
        };
        assert_eq!(
            format_context(&result),
            "[Source: rules.md]\nNo dragons.\n\n---\n\n[Source: menu.md]\nPumpkin juice."
        );
    }
}
