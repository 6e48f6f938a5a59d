//! Reader for the text form of the bridge document.
//!
//! The host writes both the multi-line layout produced by [`super::render`]
//! and a compact form with `;`-separated attributes on one line, so the
//! reader works on tokens rather than lines.

use std::collections::BTreeMap;

use crate::error::DocumentError;

use super::types::{
    AckSection, AnswerSection, BehavioralSignals, BridgeDocument, Direction, ErrorInfo,
    FinaleSection, MessageSection, MessageType, OptionEntry, ReadySection, SyncStatus,
    TransitionSection, MAX_OPTIONS,
};

/// Deepest list, dict or prim nesting the reader accepts.
pub const MAX_NESTING: usize = 64;

pub const REQUIRED_PRIMS: [&str; 7] = [
    "Message",
    "Options",
    "Answer",
    "Transition",
    "Finale",
    "Ready",
    "Ack",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Punct(char),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    line: usize,
}

fn tokenize(text: &str) -> Result<Vec<Spanned>, DocumentError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while let Some(&ch) = chars.peek() {
        match ch {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() || c == ';' || c == ',' => {
                chars.next();
            }
            '#' => {
                // Header and comments run to end of line.
                while chars.peek().is_some_and(|c| *c != '\n') {
                    chars.next();
                }
            }
            '"' => {
                chars.next();
                let start_line = line;
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => value.push('\n'),
                            Some('r') => value.push('\r'),
                            Some('t') => value.push('\t'),
                            Some(other) => value.push(other),
                            None => break,
                        },
                        Some('\n') => {
                            line += 1;
                            value.push('\n');
                        }
                        Some(other) => value.push(other),
                        None => {
                            return Err(DocumentError::Syntax {
                                line: start_line,
                                message: "unterminated string".into(),
                            });
                        }
                    }
                }
                tokens.push(Spanned {
                    token: Token::Str(value),
                    line: start_line,
                });
            }
            '(' | ')' | '{' | '}' | '[' | ']' | '=' => {
                chars.next();
                tokens.push(Spanned {
                    token: Token::Punct(ch),
                    line,
                });
            }
            c if c == '-' || c == '+' || c.is_ascii_digit() => {
                let mut raw = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+') {
                        raw.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Spanned {
                    token: Token::Number(raw),
                    line,
                });
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut raw = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || matches!(c, '_' | ':' | '.') {
                        raw.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Spanned {
                    token: Token::Ident(raw),
                    line,
                });
            }
            other => {
                return Err(DocumentError::Syntax {
                    line,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }
    Ok(tokens)
}

/// A parsed attribute or metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Number(String),
    Bool(bool),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
}

#[derive(Debug, Clone, Default)]
pub struct Prim {
    pub name: String,
    pub metadata: BTreeMap<String, Value>,
    pub attributes: BTreeMap<String, Value>,
    pub children: Vec<Prim>,
    /// variant set name → variant name → attributes
    pub variant_sets: BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>>,
}

static EMPTY_PRIM: Prim = Prim {
    name: String::new(),
    metadata: BTreeMap::new(),
    attributes: BTreeMap::new(),
    children: Vec::new(),
    variant_sets: BTreeMap::new(),
};

impl Prim {
    pub fn child(&self, name: &str) -> Option<&Prim> {
        self.children.iter().find(|c| c.name == name)
    }

    fn str_attr(&self, name: &str) -> String {
        match self.attributes.get(name) {
            Some(Value::Str(s)) => s.clone(),
            Some(Value::Number(n)) => n.clone(),
            _ => String::new(),
        }
    }

    fn float_attr(&self, name: &str) -> f64 {
        match self.attributes.get(name) {
            Some(Value::Number(n)) => n.parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    fn int_attr(&self, name: &str, default: i64) -> i64 {
        match self.attributes.get(name) {
            Some(Value::Number(n)) => parse_int(n).unwrap_or(default),
            _ => default,
        }
    }

    fn count_attr(&self, name: &str) -> u32 {
        u32::try_from(self.int_attr(name, 0)).unwrap_or(0)
    }

    fn bool_attr(&self, name: &str) -> bool {
        match self.attributes.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n != "0",
            _ => false,
        }
    }
}

/// Integer literal, also accepting an all-zero fraction (`2.0`) since hosts
/// occasionally write integral values as floats.
fn parse_int(raw: &str) -> Option<i64> {
    raw.parse().ok().or_else(|| {
        let (whole, fraction) = raw.split_once('.')?;
        if fraction.bytes().all(|b| b == b'0') {
            whole.parse().ok()
        } else {
            None
        }
    })
}

/// Parsed document: layer metadata plus top-level prims.
#[derive(Debug, Clone, Default)]
pub struct Stage {
    pub metadata: BTreeMap<String, Value>,
    pub prims: Vec<Prim>,
}

impl Stage {
    pub fn default_prim(&self) -> Option<&Prim> {
        let name = match self.metadata.get("defaultPrim") {
            Some(Value::Str(name)) => name.as_str(),
            _ => return None,
        };
        self.prims.iter().find(|p| p.name == name)
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn descend(&mut self) -> Result<(), DocumentError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(DocumentError::Malformed {
                missing: vec![format!("nesting within {MAX_NESTING} levels")],
            });
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |s| s.line)
    }

    fn error(&self, message: impl Into<String>) -> DocumentError {
        DocumentError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        self.pos += 1;
        token
    }

    fn is_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn expect_punct(&mut self, c: char) -> Result<(), DocumentError> {
        match self.next() {
            Some(Token::Punct(p)) if p == c => Ok(()),
            other => Err(self.error(format!("expected '{c}', found {other:?}"))),
        }
    }

    fn expect_str(&mut self) -> Result<String, DocumentError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            other => Err(self.error(format!("expected string, found {other:?}"))),
        }
    }

    fn stage(&mut self) -> Result<Stage, DocumentError> {
        let mut stage = Stage::default();
        if self.is_punct('(') {
            stage.metadata = self.metadata()?;
        }
        while self.peek().is_some() {
            match self.next() {
                Some(Token::Ident(kw)) if kw == "def" || kw == "over" || kw == "class" => {
                    stage.prims.push(self.prim()?);
                }
                other => return Err(self.error(format!("expected prim, found {other:?}"))),
            }
        }
        Ok(stage)
    }

    /// `( key = value ... )`; keys may be prefixed by list-op words such as
    /// `prepend`.
    fn metadata(&mut self) -> Result<BTreeMap<String, Value>, DocumentError> {
        self.expect_punct('(')?;
        let mut entries = BTreeMap::new();
        while !self.is_punct(')') {
            let mut key = None;
            while let Some(Token::Ident(word)) = self.peek() {
                key = Some(word.clone());
                self.pos += 1;
            }
            let key = key.ok_or_else(|| self.error("expected metadata key"))?;
            self.expect_punct('=')?;
            let value = self.value()?;
            entries.insert(key, value);
            if self.peek().is_none() {
                return Err(self.error("unterminated metadata"));
            }
        }
        self.expect_punct(')')?;
        Ok(entries)
    }

    fn value(&mut self) -> Result<Value, DocumentError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::Number(n)) => Ok(Value::Number(n)),
            Some(Token::Ident(word)) if word == "true" => Ok(Value::Bool(true)),
            Some(Token::Ident(word)) if word == "false" => Ok(Value::Bool(false)),
            Some(Token::Ident(word)) if word == "None" => Ok(Value::Str(String::new())),
            Some(Token::Punct('[')) => {
                self.descend()?;
                let mut items = Vec::new();
                while !self.is_punct(']') {
                    if self.peek().is_none() {
                        return Err(self.error("unterminated list"));
                    }
                    items.push(self.value()?);
                }
                self.expect_punct(']')?;
                self.ascend();
                Ok(Value::List(items))
            }
            Some(Token::Punct('{')) => {
                self.descend()?;
                let mut dict = BTreeMap::new();
                while !self.is_punct('}') {
                    let (name, value) = self.typed_entry()?;
                    dict.insert(name, value);
                }
                self.expect_punct('}')?;
                self.ascend();
                Ok(Value::Dict(dict))
            }
            other => Err(self.error(format!("expected value, found {other:?}"))),
        }
    }

    /// `type name = value`, with optional qualifiers before the type.
    fn typed_entry(&mut self) -> Result<(String, Value), DocumentError> {
        let mut name = None;
        while let Some(Token::Ident(word)) = self.peek() {
            name = Some(word.clone());
            self.pos += 1;
        }
        let name = name.ok_or_else(|| self.error("expected attribute name"))?;
        self.expect_punct('=')?;
        Ok((name, self.value()?))
    }

    /// After `def`: optional type name, quoted prim name, optional metadata,
    /// then the body.
    fn prim(&mut self) -> Result<Prim, DocumentError> {
        self.descend()?;
        if let Some(Token::Ident(_)) = self.peek() {
            self.pos += 1;
        }
        let mut prim = Prim {
            name: self.expect_str()?,
            ..Prim::default()
        };
        if self.is_punct('(') {
            prim.metadata = self.metadata()?;
        }
        self.expect_punct('{')?;
        self.prim_body(&mut prim)?;
        self.expect_punct('}')?;
        self.ascend();
        Ok(prim)
    }

    fn prim_body(&mut self, prim: &mut Prim) -> Result<(), DocumentError> {
        while !self.is_punct('}') {
            match self.peek() {
                None => return Err(self.error("unterminated prim body")),
                Some(Token::Ident(kw)) if kw == "def" || kw == "over" || kw == "class" => {
                    self.pos += 1;
                    prim.children.push(self.prim()?);
                }
                Some(Token::Ident(kw)) if kw == "variantSet" => {
                    self.pos += 1;
                    let set_name = self.expect_str()?;
                    self.expect_punct('=')?;
                    let variants = self.variant_set()?;
                    prim.variant_sets.insert(set_name, variants);
                }
                _ => {
                    let (name, value) = self.typed_entry()?;
                    prim.attributes.insert(name, value);
                }
            }
        }
        Ok(())
    }

    fn variant_set(
        &mut self,
    ) -> Result<BTreeMap<String, BTreeMap<String, Value>>, DocumentError> {
        self.descend()?;
        self.expect_punct('{')?;
        let mut variants = BTreeMap::new();
        while !self.is_punct('}') {
            let name = self.expect_str()?;
            self.expect_punct('{')?;
            let mut body = Prim::default();
            self.prim_body(&mut body)?;
            self.expect_punct('}')?;
            variants.insert(name, body.attributes);
        }
        self.expect_punct('}')?;
        self.ascend();
        Ok(variants)
    }
}

/// Parse USDA text into a generic prim tree.
pub fn parse_stage(text: &str) -> Result<Stage, DocumentError> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        pos: 0,
        depth: 0,
    };
    parser.stage()
}

fn variant_selection(root: &Prim, set: &str) -> Option<String> {
    match root.metadata.get("variants") {
        Some(Value::Dict(dict)) => match dict.get(set) {
            Some(Value::Str(s)) => Some(s.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Parse USDA text into a typed bridge document.
///
/// Missing required prims or variant selections are reported together as
/// [`DocumentError::Malformed`].
pub fn parse(text: &str) -> Result<BridgeDocument, DocumentError> {
    let stage = parse_stage(text)?;
    let root = stage.default_prim().ok_or_else(|| DocumentError::Malformed {
        missing: vec!["BridgeState".into()],
    })?;

    let mut missing: Vec<String> = REQUIRED_PRIMS
        .iter()
        .filter(|name| root.child(name).is_none())
        .map(|name| (*name).to_string())
        .collect();
    let sync = variant_selection(root, "sync_status");
    let kind = variant_selection(root, "message_type");
    if sync.is_none() {
        missing.push("sync_status variant".into());
    }
    if kind.is_none() {
        missing.push("message_type variant".into());
    }
    let (Some(sync), Some(kind), true) = (sync, kind, missing.is_empty()) else {
        return Err(DocumentError::Malformed { missing });
    };

    let sync_status = SyncStatus::parse(&sync)?;
    let message_type = MessageType::parse(&kind)?;
    let section = |name: &str| root.child(name).unwrap_or(&EMPTY_PRIM);

    let error = root
        .variant_sets
        .get("sync_status")
        .and_then(|v| v.get("error"))
        .map(|attrs| {
            let holder = Prim {
                attributes: attrs.clone(),
                ..Prim::default()
            };
            ErrorInfo {
                message: holder.str_attr("error_message"),
                code: holder.str_attr("error_code"),
            }
        })
        .filter(|e| sync_status == SyncStatus::Error || !e.message.is_empty());

    let m = section("Message");
    let message = MessageSection {
        kind: match m.str_attr("type").as_str() {
            "" => MessageType::None,
            raw => MessageType::parse(raw)?,
        },
        index: m.count_attr("index"),
        total: m.count_attr("total"),
        timestamp: m.str_attr("timestamp"),
        question_id: m.str_attr("question_id"),
        text: m.str_attr("text"),
        scene: m.str_attr("scene"),
    };

    let mut options = Vec::new();
    for i in 0..MAX_OPTIONS {
        let Some(o) = section("Options").child(&format!("Option_{i}")) else {
            continue;
        };
        let direction = o.str_attr("direction");
        // Placeholder slots carry empty labels and directions.
        if direction.is_empty() && o.str_attr("label").is_empty() {
            continue;
        }
        options.push(OptionEntry {
            index: o.count_attr("index"),
            label: o.str_attr("label"),
            direction: Direction::parse(&direction)?,
            semantic_tag: o.str_attr("semantic_tag"),
        });
    }

    let a = section("Answer");
    let answer = AnswerSection {
        question_id: a.str_attr("question_id"),
        option_index: i32::try_from(a.int_attr("option_index", -1)).unwrap_or(-1),
        response_time_ms: a.float_attr("response_time_ms"),
        selected_label: a.str_attr("selected_label"),
        selected_direction: a.str_attr("selected_direction"),
        timestamp: a.str_attr("timestamp"),
    };

    let t = section("Transition");
    let f = section("Finale");
    let r = section("Ready");
    let k = section("Ack");
    let defaults = BehavioralSignals::default();
    let signals = root.child("BehavioralSignals").map_or_else(
        || defaults.clone(),
        |s| {
            let text_or = |name: &str, fallback: &str| {
                let v = s.str_attr(name);
                if v.is_empty() { fallback.to_string() } else { v }
            };
            BehavioralSignals {
                last_response_time_ms: s.float_attr("last_response_time_ms"),
                average_response_time_ms: s.float_attr("average_response_time_ms"),
                hesitation_count: s.count_attr("hesitation_count"),
                long_hesitation_detected: s.bool_attr("long_hesitation_detected"),
                rapid_click_count: s.count_attr("rapid_click_count"),
                skip_count: s.count_attr("skip_count"),
                back_navigation_count: s.count_attr("back_navigation_count"),
                detected_state: text_or("detected_state", &defaults.detected_state),
                recommended_expert: text_or("recommended_expert", &defaults.recommended_expert),
                burnout_level: text_or("burnout_level", &defaults.burnout_level),
                momentum_phase: text_or("momentum_phase", &defaults.momentum_phase),
            }
        },
    );

    let generated_at = match stage.metadata.get("doc") {
        Some(Value::Str(doc)) => doc
            .rsplit_once("Generated ")
            .map(|(_, ts)| ts.to_string())
            .unwrap_or_default(),
        _ => String::new(),
    };

    Ok(BridgeDocument {
        sync_status,
        message_type,
        generated_at,
        error,
        message,
        options,
        answer,
        transition: TransitionSection {
            direction: t.str_attr("direction"),
            next_scene: t.str_attr("next_scene"),
            progress: t.float_attr("progress"),
            from_question_id: t.str_attr("from_question_id"),
        },
        finale: FinaleSection {
            message: f.str_attr("message"),
            usd_path: f.str_attr("usd_path"),
            checksum: f.str_attr("checksum"),
            total_questions: f.count_attr("total_questions"),
            questions_answered: f.count_attr("questions_answered"),
        },
        ready: ReadySection {
            total_questions: r.count_attr("total_questions"),
            first_scene: r.str_attr("first_scene"),
            bridge_version: r.str_attr("bridge_version"),
            protocol: r.str_attr("protocol"),
            timestamp: r.str_attr("timestamp"),
        },
        ack: AckSection {
            ready: k.bool_attr("ready"),
            host_version: k.str_attr("ue_version"),
            project: k.str_attr("project"),
            timestamp: k.str_attr("timestamp"),
        },
        signals,
    })
}
