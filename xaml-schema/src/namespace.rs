//! Well-known XML namespaces and xmlns URI handling.

/// The XAML language namespace (`x:`).
pub const XAML_NAMESPACE: &str = "http://schemas.microsoft.com/winfx/2006/xaml";

/// The XML namespace (`xml:`), implicitly bound.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Prefix of code-namespace xmlns URIs.
const USING_PREFIX: &str = "using:";

/// Members recognised by the writer rather than resolved on a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, facet::Facet)]
#[repr(u8)]
pub enum Directive {
    /// `x:Name`
    Name,
    /// `x:Key`
    Key,
    /// `x:Uid`
    Uid,
    /// `x:Load`
    Load,
    /// `x:DeferLoadStrategy`
    DeferLoadStrategy,
    /// `xml:space`
    Space,
}

impl Directive {
    /// Look up a directive by member namespace and name.
    pub fn lookup(namespace: &str, name: &str) -> Option<Self> {
        match (namespace, name) {
            (XAML_NAMESPACE, "Name") => Some(Directive::Name),
            (XAML_NAMESPACE, "Key") => Some(Directive::Key),
            (XAML_NAMESPACE, "Uid") => Some(Directive::Uid),
            (XAML_NAMESPACE, "Load") => Some(Directive::Load),
            (XAML_NAMESPACE, "DeferLoadStrategy") => Some(Directive::DeferLoadStrategy),
            (XML_NAMESPACE, "space") => Some(Directive::Space),
            _ => None,
        }
    }

    /// Name as written in markup, with its conventional prefix.
    pub fn markup_name(self) -> &'static str {
        match self {
            Directive::Name => "x:Name",
            Directive::Key => "x:Key",
            Directive::Uid => "x:Uid",
            Directive::Load => "x:Load",
            Directive::DeferLoadStrategy => "x:DeferLoadStrategy",
            Directive::Space => "xml:space",
        }
    }
}

/// Extract the code namespace from a `using:` xmlns.
///
/// The remainder must be non-empty, contain no whitespace and no further colon.
pub fn crack_using_xmlns(uri: &str) -> Option<&str> {
    let rest = uri.strip_prefix(USING_PREFIX)?;
    if rest.is_empty() || rest.contains(':') || rest.chars().any(char::is_whitespace) {
        return None;
    }
    Some(rest)
}
