//! XML-RPC codec.
//!
//! Decodes `methodCall` documents into typed values and encodes
//! `methodResponse` documents (plain results and faults). The decoder first
//! builds a small element tree with `quick-xml`, then interprets it, so the
//! value grammar below is checked in one place.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::error::RpcError;

/// An XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Double(f64),
    DateTime(String),
    Base64(String),
    Struct(BTreeMap<String, Value>),
    Array(Vec<Value>),
    Nil,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Double(_) => "double",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Base64(_) => "base64",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
            Value::Nil => "nil",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Converts into the equivalent JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Int(i) => Json::from(*i),
            Value::Bool(b) => Json::Bool(*b),
            Value::Str(s) | Value::DateTime(s) | Value::Base64(s) => Json::String(s.clone()),
            Value::Double(d) => Json::from(*d),
            Value::Struct(members) => Json::Object(
                members
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Nil => Json::Null,
        }
    }
}

/// A decoded `methodCall`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub name: String,
    pub params: Vec<Value>,
}

/// A decoded `methodResponse`.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault { code: i64, message: String },
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    children: Vec<Node>,
}

#[derive(Debug)]
enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    fn expect_child(&self, name: &str) -> Result<&Element, RpcError> {
        self.child(name).ok_or_else(|| {
            RpcError::Protocol(format!("<{}> is missing <{}>", self.name, name))
        })
    }

    fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }
}

fn parse_tree(xml: &str) -> Result<Element, RpcError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Element {
                name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
                children: Vec::new(),
            }),
            Event::Empty(empty) => {
                let element = Element {
                    name: String::from_utf8_lossy(empty.name().as_ref()).into_owned(),
                    children: Vec::new(),
                };
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| RpcError::Xml("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text.unescape()?.into_owned()));
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    parent.children.push(Node::Text(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(RpcError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| RpcError::Xml("empty document".to_string()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), RpcError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(RpcError::Xml("multiple root elements".to_string())),
    }
    Ok(())
}

fn parse_value(value: &Element) -> Result<Value, RpcError> {
    let Some(typed) = value.elements().next() else {
        return Ok(Value::Str(value.text()));
    };
    let text = typed.text();
    let parsed = match typed.name.as_str() {
        "int" | "i4" | "i8" => Value::Int(
            text.trim()
                .parse()
                .map_err(|_| RpcError::Protocol(format!("invalid integer '{}'", text)))?,
        ),
        "boolean" => match text.trim() {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            other => return Err(RpcError::Protocol(format!("invalid boolean '{}'", other))),
        },
        "string" => Value::Str(text),
        "double" => Value::Double(
            text.trim()
                .parse()
                .map_err(|_| RpcError::Protocol(format!("invalid double '{}'", text)))?,
        ),
        "dateTime.iso8601" => Value::DateTime(text.trim().to_string()),
        "base64" => Value::Base64(text.trim().to_string()),
        "nil" => Value::Nil,
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.elements().filter(|e| e.name == "member") {
                let name = member.expect_child("name")?.text();
                let value = parse_value(member.expect_child("value")?)?;
                members.insert(name, value);
            }
            Value::Struct(members)
        }
        "array" => {
            let data = typed.expect_child("data")?;
            let items = data
                .elements()
                .filter(|e| e.name == "value")
                .map(parse_value)
                .collect::<Result<Vec<_>, _>>()?;
            Value::Array(items)
        }
        other => return Err(RpcError::Protocol(format!("unsupported type <{}>", other))),
    };
    Ok(parsed)
}

fn parse_params(parent: &Element) -> Result<Vec<Value>, RpcError> {
    let Some(params) = parent.child("params") else {
        return Ok(Vec::new());
    };
    params
        .elements()
        .filter(|e| e.name == "param")
        .map(|param| parse_value(param.expect_child("value")?))
        .collect()
}

/// Decodes a `methodCall` document.
pub fn parse_call(xml: &str) -> Result<MethodCall, RpcError> {
    let root = parse_tree(xml)?;
    if root.name != "methodCall" {
        return Err(RpcError::Protocol(format!(
            "expected <methodCall>, found <{}>",
            root.name
        )));
    }
    let name = root.expect_child("methodName")?.text().trim().to_string();
    if name.is_empty() {
        return Err(RpcError::Protocol("empty method name".to_string()));
    }
    Ok(MethodCall {
        name,
        params: parse_params(&root)?,
    })
}

/// Decodes a `methodResponse` document.
pub fn parse_response(xml: &str) -> Result<MethodResponse, RpcError> {
    let root = parse_tree(xml)?;
    if root.name != "methodResponse" {
        return Err(RpcError::Protocol(format!(
            "expected <methodResponse>, found <{}>",
            root.name
        )));
    }
    if let Some(fault) = root.child("fault") {
        let Value::Struct(members) = parse_value(fault.expect_child("value")?)? else {
            return Err(RpcError::Protocol("fault value is not a struct".to_string()));
        };
        let code = match members.get("faultCode") {
            Some(Value::Int(code)) => *code,
            _ => 0,
        };
        let message = members
            .get("faultString")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(MethodResponse::Fault { code, message });
    }
    let mut params = parse_params(&root)?;
    if params.len() != 1 {
        return Err(RpcError::Protocol(format!(
            "expected one result, found {}",
            params.len()
        )));
    }
    Ok(MethodResponse::Success(params.remove(0)))
}

fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => {
            let _ = write!(out, "<int>{}</int>", i);
        }
        Value::Bool(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
        }
        Value::Str(s) => {
            let _ = write!(out, "<string>{}</string>", escape(s.as_str()));
        }
        Value::Double(d) => {
            let _ = write!(out, "<double>{:?}</double>", d);
        }
        Value::DateTime(s) => {
            let _ = write!(out, "<dateTime.iso8601>{}</dateTime.iso8601>", escape(s.as_str()));
        }
        Value::Base64(s) => {
            let _ = write!(out, "<base64>{}</base64>", escape(s.as_str()));
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                let _ = write!(out, "<member><name>{}</name>", escape(name.as_str()));
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}

/// Encodes a successful `methodResponse`.
pub fn encode_response(value: &Value) -> String {
    let mut out = String::from("<?xml version='1.0'?>\n<methodResponse>\n<params>\n<param>\n");
    write_value(&mut out, value);
    out.push_str("\n</param>\n</params>\n</methodResponse>\n");
    out
}

/// Encodes a fault `methodResponse`.
pub fn encode_fault(code: i64, message: &str) -> String {
    let mut members = BTreeMap::new();
    members.insert("faultCode".to_string(), Value::Int(code));
    members.insert("faultString".to_string(), Value::Str(message.to_string()));
    let mut out = String::from("<?xml version='1.0'?>\n<methodResponse>\n<fault>\n");
    write_value(&mut out, &Value::Struct(members));
    out.push_str("\n</fault>\n</methodResponse>\n");
    out
}

/// Encodes a `methodCall`.
pub fn encode_call(name: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version='1.0'?>\n<methodCall>\n");
    let _ = write!(out, "<methodName>{}</methodName>\n<params>\n", escape(name));
    for param in params {
        out.push_str("<param>\n");
        write_value(&mut out, param);
        out.push_str("\n</param>\n");
    }
    out.push_str("</params>\n</methodCall>\n");
    out
}
