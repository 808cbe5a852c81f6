use crate::errors::AutomationError;
use std::fmt;
use std::str::FromStr;

/// Comparison operator inside an attribute block, e.g. `[name^="search"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrOperator {
    /// `=` exact match
    Equals,
    /// `!=` not equal
    NotEquals,
    /// `^=` prefix match
    StartsWith,
    /// `$=` suffix match
    EndsWith,
    /// `*=` substring match
    Contains,
    /// `~=` membership in the whitespace-separated token list
    IncludesWord,
    /// `|=` exact match or hyphen-prefixed match
    DashMatch,
}

impl AttrOperator {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "=" => Some(Self::Equals),
            "!=" => Some(Self::NotEquals),
            "^=" => Some(Self::StartsWith),
            "$=" => Some(Self::EndsWith),
            "*=" => Some(Self::Contains),
            "~=" => Some(Self::IncludesWord),
            "|=" => Some(Self::DashMatch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::StartsWith => "^=",
            Self::EndsWith => "$=",
            Self::Contains => "*=",
            Self::IncludesWord => "~=",
            Self::DashMatch => "|=",
        }
    }

    /// Apply the operator to a field value read from a widget.
    pub fn evaluate(&self, value: &str, target: &str) -> bool {
        match self {
            Self::Equals => value == target,
            Self::NotEquals => value != target,
            Self::StartsWith => value.starts_with(target),
            Self::EndsWith => value.ends_with(target),
            Self::Contains => value.contains(target),
            Self::IncludesWord => value.split_whitespace().any(|word| word == target),
            Self::DashMatch => {
                value == target || value.strip_prefix(target).is_some_and(|rest| rest.starts_with('-'))
            }
        }
    }
}

/// State predicate attached with a `:` prefix, e.g. `button:visible`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pseudo {
    Visible,
    Hidden,
    Enabled,
    Disabled,
    Focused,
    Selected,
    Checked,
    Empty,
    /// First element of the matched sequence. Positional: resolved as a
    /// post-filter over the whole result set, never per widget.
    First,
    /// Last element of the matched sequence. Positional, like [`Pseudo::First`].
    Last,
}

impl Pseudo {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "visible" => Some(Self::Visible),
            "hidden" => Some(Self::Hidden),
            "enabled" => Some(Self::Enabled),
            "disabled" => Some(Self::Disabled),
            "focused" => Some(Self::Focused),
            "selected" => Some(Self::Selected),
            "checked" => Some(Self::Checked),
            "empty" => Some(Self::Empty),
            "first" => Some(Self::First),
            "last" => Some(Self::Last),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Hidden => "hidden",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Focused => "focused",
            Self::Selected => "selected",
            Self::Checked => "checked",
            Self::Empty => "empty",
            Self::First => "first",
            Self::Last => "last",
        }
    }

    /// Positional pseudo-selectors need the whole result set for context.
    pub fn is_positional(&self) -> bool {
        matches!(self, Self::First | Self::Last)
    }
}

/// Geometric relation between the subject and a target selector,
/// e.g. `label near text[name="username"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialRelation {
    Near,
    Above,
    Below,
    LeftOf,
    RightOf,
    Inside,
    Contains,
}

impl SpatialRelation {
    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "near" => Some(Self::Near),
            "above" => Some(Self::Above),
            "below" => Some(Self::Below),
            "left_of" => Some(Self::LeftOf),
            "right_of" => Some(Self::RightOf),
            "inside" => Some(Self::Inside),
            "contains" => Some(Self::Contains),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Near => "near",
            Self::Above => "above",
            Self::Below => "below",
            Self::LeftOf => "left_of",
            Self::RightOf => "right_of",
            Self::Inside => "inside",
            Self::Contains => "contains",
        }
    }
}

/// One `(name, operator, value)` predicate from an attribute block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePredicate {
    pub name: String,
    pub op: AttrOperator,
    pub value: String,
}

/// Spatial clause of a selector: relation keyword plus the recursively
/// parsed target selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialClause {
    pub relation: SpatialRelation,
    pub target: Box<SelectorPart>,
}

/// A parsed selector.
///
/// Grammar: `selector := simple (spatial_kw simple)?` with
/// `simple := type? attr* pseudo*`. An absent element type matches any
/// role. Parsing is pure and idempotent; malformed input is rejected with
/// [`AutomationError::InvalidSelector`] rather than silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectorPart {
    pub element_type: Option<String>,
    pub attributes: Vec<AttributePredicate>,
    pub pseudos: Vec<Pseudo>,
    pub spatial: Option<SpatialClause>,
}

impl SelectorPart {
    /// Parse a selector string.
    ///
    /// ```
    /// use asq::SelectorPart;
    /// let part = SelectorPart::parse(r#"button[name="Save"]:visible"#)?;
    /// assert_eq!(part.element_type.as_deref(), Some("button"));
    /// # Ok::<(), asq::AutomationError>(())
    /// ```
    pub fn parse(selector: &str) -> Result<Self, AutomationError> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(AutomationError::InvalidSelector(
                "empty selector".to_string(),
            ));
        }

        if let Some((subject, relation, target)) = split_spatial(selector)? {
            let mut part = parse_simple(subject)?;
            part.spatial = Some(SpatialClause {
                relation,
                target: Box::new(SelectorPart::parse(target)?),
            });
            return Ok(part);
        }

        parse_simple(selector)
    }

    /// True if the matched sequence still needs positional post-filtering.
    pub fn has_positional_pseudo(&self) -> bool {
        self.pseudos.iter().any(Pseudo::is_positional)
    }
}

impl FromStr for SelectorPart {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SelectorPart::parse(s)
    }
}

impl fmt::Display for SelectorPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(element_type) = &self.element_type {
            write!(f, "{element_type}")?;
        }
        for attr in &self.attributes {
            write!(f, "[{}{}\"{}\"]", attr.name, attr.op.as_str(), attr.value)?;
        }
        for pseudo in &self.pseudos {
            write!(f, ":{}", pseudo.as_str())?;
        }
        if let Some(clause) = &self.spatial {
            write!(f, " {} {}", clause.relation.as_str(), clause.target)?;
        }
        Ok(())
    }
}

/// Find the first spatial keyword that stands alone between two selector
/// halves: a whitespace-delimited word outside attribute brackets and
/// quotes, with selector text on both sides.
fn split_spatial(selector: &str) -> Result<Option<(&str, SpatialRelation, &str)>, AutomationError> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut word_start: Option<usize> = None;

    for (i, ch) in selector.char_indices() {
        match ch {
            '"' if depth > 0 => in_quotes = !in_quotes,
            '[' if !in_quotes => depth += 1,
            ']' if !in_quotes => depth = depth.saturating_sub(1),
            _ => {}
        }

        let at_top_level = depth == 0 && !in_quotes;
        if at_top_level && ch.is_whitespace() {
            if let Some(start) = word_start.take() {
                // A keyword must have subject text before it.
                if start > 0 {
                    if let Some(relation) = SpatialRelation::from_keyword(&selector[start..i]) {
                        let subject = selector[..start].trim();
                        let target = selector[i..].trim();
                        if subject.is_empty() || target.is_empty() {
                            return Err(AutomationError::InvalidSelector(format!(
                                "spatial relation '{}' requires a selector on both sides",
                                relation.as_str()
                            )));
                        }
                        return Ok(Some((subject, relation, target)));
                    }
                }
            }
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }

    // Keyword as the final word has no target selector after it.
    if let Some(start) = word_start {
        if start > 0 {
            if let Some(relation) = SpatialRelation::from_keyword(&selector[start..]) {
                return Err(AutomationError::InvalidSelector(format!(
                    "spatial relation '{}' is missing a target selector",
                    relation.as_str()
                )));
            }
        }
    }

    Ok(None)
}

/// Parse a simple selector: pseudo-selectors first, then attribute blocks,
/// the trimmed remainder is the element type.
fn parse_simple(selector: &str) -> Result<SelectorPart, AutomationError> {
    let mut part = SelectorPart::default();
    let without_pseudos = extract_pseudos(selector, &mut part.pseudos)?;
    let without_attrs = extract_attributes(&without_pseudos, &mut part.attributes)?;

    let element_type = without_attrs.trim();
    if element_type.contains('[') || element_type.contains(']') {
        return Err(AutomationError::InvalidSelector(format!(
            "unbalanced attribute brackets in '{selector}'"
        )));
    }
    if element_type.contains('"') {
        return Err(AutomationError::InvalidSelector(format!(
            "stray quote outside attribute block in '{selector}'"
        )));
    }
    if !element_type.is_empty() {
        part.element_type = Some(element_type.to_string());
    }

    Ok(part)
}

/// Strip `:name` pseudo-selectors (outside attribute blocks) and collect
/// them in declaration order.
fn extract_pseudos(selector: &str, pseudos: &mut Vec<Pseudo>) -> Result<String, AutomationError> {
    let mut rest = String::with_capacity(selector.len());
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut chars = selector.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '"' if depth > 0 => in_quotes = !in_quotes,
            '[' if !in_quotes => depth += 1,
            ']' if !in_quotes => depth = depth.saturating_sub(1),
            _ => {}
        }

        if ch == ':' && depth == 0 && !in_quotes {
            let name_start = i + 1;
            let mut name_end = name_start;
            while let Some(&(j, c)) = chars.peek() {
                let valid = if name_end == name_start {
                    c.is_ascii_alphabetic() || c == '_'
                } else {
                    c.is_ascii_alphanumeric() || c == '_' || c == '-'
                };
                if !valid {
                    break;
                }
                chars.next();
                name_end = j + c.len_utf8();
            }
            let name = &selector[name_start..name_end];
            if name.is_empty() {
                return Err(AutomationError::InvalidSelector(
                    "expected pseudo-selector name after ':'".to_string(),
                ));
            }
            let pseudo = Pseudo::from_name(name).ok_or_else(|| {
                AutomationError::InvalidSelector(format!("unknown pseudo-selector ':{name}'"))
            })?;
            pseudos.push(pseudo);
        } else {
            rest.push(ch);
        }
    }

    Ok(rest)
}

/// Strip `[name op "value"]` blocks and collect their predicates in
/// declaration order.
fn extract_attributes(
    selector: &str,
    attributes: &mut Vec<AttributePredicate>,
) -> Result<String, AutomationError> {
    let mut rest = String::with_capacity(selector.len());
    let mut remainder = selector;

    while let Some(open) = remainder.find('[') {
        rest.push_str(&remainder[..open]);
        let body_start = open + 1;
        let close = find_block_end(&remainder[body_start..]).ok_or_else(|| {
            AutomationError::InvalidSelector(format!(
                "unterminated attribute block in '{selector}'"
            ))
        })?;
        let body = &remainder[body_start..body_start + close];
        attributes.push(parse_attribute(body)?);
        remainder = &remainder[body_start + close + 1..];
    }

    rest.push_str(remainder);
    Ok(rest)
}

/// Offset of the `]` closing the current attribute block, ignoring any
/// bracket characters inside a quoted value.
fn find_block_end(body: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, ch) in body.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ']' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Parse the inside of one attribute block: `name op "value"`.
fn parse_attribute(body: &str) -> Result<AttributePredicate, AutomationError> {
    let eq = body.find('=').ok_or_else(|| {
        AutomationError::InvalidSelector(format!(
            "attribute block '[{body}]' is missing a comparison operator"
        ))
    })?;

    let (name_end, op_token) = match body[..eq].chars().next_back() {
        Some(prefix @ ('!' | '^' | '$' | '*' | '~' | '|')) => {
            (eq - prefix.len_utf8(), &body[eq - prefix.len_utf8()..=eq])
        }
        _ => (eq, &body[eq..=eq]),
    };

    let op = AttrOperator::from_token(op_token).ok_or_else(|| {
        AutomationError::InvalidSelector(format!(
            "unknown attribute operator '{op_token}' in '[{body}]'"
        ))
    })?;

    let name = body[..name_end].trim();
    if name.is_empty() {
        return Err(AutomationError::InvalidSelector(format!(
            "attribute block '[{body}]' is missing an attribute name"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AutomationError::InvalidSelector(format!(
            "invalid attribute name '{name}' in '[{body}]'"
        )));
    }

    let raw_value = body[eq + 1..].trim();
    let value = if let Some(stripped) = raw_value.strip_prefix('"') {
        stripped.strip_suffix('"').ok_or_else(|| {
            AutomationError::InvalidSelector(format!(
                "unterminated quoted value in '[{body}]'"
            ))
        })?
    } else if raw_value.contains('"') {
        return Err(AutomationError::InvalidSelector(format!(
            "mismatched quotes in '[{body}]'"
        )));
    } else {
        raw_value
    };

    Ok(AttributePredicate {
        name: name.to_string(),
        op,
        value: value.to_string(),
    })
}
