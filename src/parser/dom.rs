// Namespace-stripped read-only DOM over quick-xml reader events
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

// Deeper documents are rejected as unparsable
pub const MAX_DEPTH: usize = 256;

// An inbound element. Names are local names, prefixes are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    // Parses a whole document and returns its root element.
    pub fn parse(xml: &str) -> Result<XmlNode, String> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(format!("nesting deeper than {} elements", MAX_DEPTH));
                    }
                    stack.push(open(&e)?)
                }
                Ok(Event::Empty(e)) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(format!("nesting deeper than {} elements", MAX_DEPTH));
                    }
                    let node = open(&e)?;
                    attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::End(_)) => {
                    let mut node = stack
                        .pop()
                        .ok_or_else(|| "unexpected closing tag".to_string())?;
                    node.text = node.text.trim().to_string();
                    attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::Text(t)) => {
                    if let Some(current) = stack.last_mut() {
                        let raw = std::str::from_utf8(&t).map_err(|e| e.to_string())?;
                        let value = unescape(raw).map_err(|e| e.to_string())?;
                        current.text.push_str(&value);
                    }
                }
                Ok(Event::CData(t)) => {
                    if let Some(current) = stack.last_mut() {
                        let raw = std::str::from_utf8(&t).map_err(|e| e.to_string())?;
                        current.text.push_str(raw);
                    }
                }
                Ok(Event::GeneralRef(r)) => {
                    if let Some(current) = stack.last_mut() {
                        let name = std::str::from_utf8(&r).map_err(|e| e.to_string())?;
                        current.text.push(resolve_reference(name)?);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(format!(
                        "error at position {}: {}",
                        reader.error_position(),
                        e
                    ))
                }
                _ => (),
            }
        }

        if !stack.is_empty() {
            return Err(format!("unclosed element <{}>", stack[stack.len() - 1].name));
        }
        root.ok_or_else(|| "document has no root element".to_string())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // Attribute value, blank values treated as absent.
    pub fn attr_non_empty(&self, name: &str) -> Option<&str> {
        self.attr(name).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a XmlNode> + 'n
    where
        'a: 'n,
    {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }

    // Follows a chain of direct children.
    pub fn path(&self, names: &[&str]) -> Option<&XmlNode> {
        names.iter().try_fold(self, |node, name| node.child(name))
    }

    // Depth-first search, this node included.
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        self.walk().find(|node| node.name == name)
    }

    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a XmlNode> {
        self.walk().filter(|node| node.name == name).collect()
    }

    // Pre-order traversal over an explicit stack
    fn walk(&self) -> impl Iterator<Item = &XmlNode> + '_ {
        let mut pending = vec![self];
        std::iter::from_fn(move || {
            let node = pending.pop()?;
            pending.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

fn open(start: &BytesStart<'_>) -> Result<XmlNode, String> {
    let name = std::str::from_utf8(start.local_name().as_ref())
        .map_err(|e| e.to_string())?
        .to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(|e| e.to_string())?
            .to_string();
        // namespace declarations carry no data
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let raw = std::str::from_utf8(&attr.value).map_err(|e| e.to_string())?;
        let value = unescape(raw).map_err(|e| e.to_string())?.into_owned();
        attributes.push((key, value));
    }

    Ok(XmlNode {
        name,
        attributes,
        ..Default::default()
    })
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err("more than one root element".to_string()),
    }
}

fn resolve_reference(name: &str) -> Result<char, String> {
    let resolved = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok()
            } else {
                None
            };
            code.and_then(char::from_u32)
        }
    };
    resolved.ok_or_else(|| format!("unknown entity &{};", name))
}
