//! Markup extension parsing and evaluation.
//!
//! An extension expression has the form `{Type positional, Name=Value}`.
//! Values may be bare text, quoted text or nested expressions. The first
//! positional argument binds to the extension type's content property.

use std::sync::Arc;

use xaml_schema::{ExtensionKind, PropertyIndex, SchemaContext, TypeIndex};

use crate::error::{ErrorKind, XamlError};
use crate::graph::{Expression, ObjectId, Value};
use crate::settings::MarkupExtensionProvider;
use crate::tracing_macros::trace;

/// A parsed, unresolved extension expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionExpr {
    /// xmlns prefix of the type name, if written.
    pub prefix: Option<String>,
    /// Type name as written.
    pub name: String,
    /// Positional arguments.
    pub positional: Vec<ExprArg>,
    /// Named arguments, in order.
    pub named: Vec<(String, ExprArg)>,
}

/// One argument of an extension expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprArg {
    /// Literal text.
    Text(String),
    /// A nested expression.
    Nested(ExtensionExpr),
}

/// An extension with resolved type and evaluated arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionCall {
    /// The extension type.
    pub ty: TypeIndex,
    /// Its kind.
    pub kind: ExtensionKind,
    /// Positional arguments.
    pub positional: Vec<Value>,
    /// Named arguments.
    pub named: Vec<(String, Value)>,
}

impl ExtensionCall {
    /// A call with no arguments yet.
    pub fn new(ty: TypeIndex, kind: ExtensionKind) -> Self {
        Self {
            ty,
            kind,
            positional: Vec::new(),
            named: Vec::new(),
        }
    }

    /// Argument `name`, falling back to the first positional argument when
    /// `name` is the type's content property.
    pub fn arg(&self, schema: &SchemaContext, name: &str) -> Option<&Value> {
        if let Some((_, v)) = self.named.iter().find(|(n, _)| n == name) {
            return Some(v);
        }
        let positional_name = schema.content_property(self.ty).map(|p| p.name.as_str());
        if positional_name == Some(name) {
            self.positional.first()
        } else {
            None
        }
    }

    /// Argument `name` rendered as text.
    pub fn text_arg(&self, schema: &SchemaContext, name: &str) -> Option<String> {
        match self.arg(schema, name)? {
            Value::Scalar(s) => Some(schema.format_scalar(s)),
            _ => None,
        }
    }
}

/// Where an extension's value is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionTarget {
    /// Object receiving the value, if it exists yet.
    pub object: Option<ObjectId>,
    /// Type of that object.
    pub owner_type: Option<TypeIndex>,
    /// Property receiving the value.
    pub property: Option<PropertyIndex>,
}

/// Outcome of evaluating an extension.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    /// The provided value.
    Ready(Value),
    /// A theme resource value, to be recorded for refresh.
    Theme {
        /// Resource key.
        key: String,
        /// Current value.
        value: Value,
    },
    /// A resource that does not exist yet.
    Deferred {
        /// Awaited key.
        key: String,
        /// Whether it came from `{ThemeResource}`.
        theme: bool,
    },
}

/// What evaluation needs from the writer.
pub(crate) trait ExtensionHost {
    fn schema(&self) -> &SchemaContext;
    fn namespace_for_prefix(&self, prefix: &str) -> Option<String>;
    fn lookup_resource(&self, key: &str) -> Option<Value>;
    fn provider(&self, ty: TypeIndex) -> Option<Arc<dyn MarkupExtensionProvider>>;
}

/// Parse an extension expression.
pub fn parse_extension(text: &str) -> Result<ExtensionExpr, String> {
    let mut p = ExprParser { src: text, pos: 0 };
    let expr = p.expr()?;
    p.skip_ws();
    if p.pos != p.src.len() {
        return Err(format!("unexpected text after extension at offset {}", p.pos));
    }
    Ok(expr)
}

struct ExprParser<'a> {
    src: &'a str,
    pos: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), String> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(format!("expected '{want}', found '{c}'")),
            None => Err(format!("expected '{want}', found end of expression")),
        }
    }

    fn expr(&mut self) -> Result<ExtensionExpr, String> {
        self.skip_ws();
        self.expect('{')?;
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && c != '}' && c != ',')
        {
            self.bump();
        }
        let type_name = &self.src[start..self.pos];
        if type_name.is_empty() {
            return Err("missing extension type name".to_owned());
        }
        let (prefix, name) = match type_name.split_once(':') {
            Some((p, n)) => (Some(p.to_owned()), n.to_owned()),
            None => (None, type_name.to_owned()),
        };
        let mut expr = ExtensionExpr {
            prefix,
            name,
            positional: Vec::new(),
            named: Vec::new(),
        };

        self.skip_ws();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(expr);
        }
        loop {
            self.arg(&mut expr)?;
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(expr),
                Some(c) => return Err(format!("unexpected '{c}' in extension arguments")),
                None => return Err("unterminated extension".to_owned()),
            }
        }
    }

    fn arg(&mut self, expr: &mut ExtensionExpr) -> Result<(), String> {
        self.skip_ws();
        match self.peek() {
            Some('{') => {
                let nested = self.expr()?;
                expr.positional.push(ExprArg::Nested(nested));
            }
            Some('\'' | '"') => {
                let text = self.quoted()?;
                expr.positional.push(ExprArg::Text(text));
            }
            _ => {
                let text = self.raw(&[',', '}', '='])?;
                if self.peek() == Some('=') {
                    self.bump();
                    let name = text.trim().to_owned();
                    if name.is_empty() {
                        return Err("missing argument name before '='".to_owned());
                    }
                    let value = self.value()?;
                    expr.named.push((name, value));
                } else {
                    expr.positional.push(ExprArg::Text(text.trim().to_owned()));
                }
            }
        }
        Ok(())
    }

    fn value(&mut self) -> Result<ExprArg, String> {
        self.skip_ws();
        match self.peek() {
            Some('{') => Ok(ExprArg::Nested(self.expr()?)),
            Some('\'' | '"') => Ok(ExprArg::Text(self.quoted()?)),
            _ => Ok(ExprArg::Text(self.raw(&[',', '}'])?.trim().to_owned())),
        }
    }

    fn quoted(&mut self) -> Result<String, String> {
        let quote = self.bump().ok_or("expected quote")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => out.push(self.bump().ok_or("dangling escape")?),
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err("unterminated quoted value".to_owned()),
            }
        }
    }

    fn raw(&mut self, stops: &[char]) -> Result<String, String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                break;
            }
            self.bump();
            if c == '\\' {
                out.push(self.bump().ok_or("dangling escape")?);
            } else {
                out.push(c);
            }
        }
        Ok(out)
    }
}

fn eval_error(message: impl Into<String>) -> XamlError {
    XamlError::new(ErrorKind::ExtensionEvaluation, message)
}

/// Parse and evaluate `text`.
pub(crate) fn evaluate(
    host: &dyn ExtensionHost,
    text: &str,
    target: Option<&ExtensionTarget>,
) -> Result<Evaluated, XamlError> {
    let expr = parse_extension(text).map_err(|e| eval_error(e).with_name(text))?;
    let call = build_call(host, &expr)?;
    provide(host, &call, target)
}

/// Resolve the extension type, looking for `Name` then `NameExtension`.
pub(crate) fn resolve_extension_type(
    host: &dyn ExtensionHost,
    prefix: Option<&str>,
    name: &str,
) -> Result<(TypeIndex, ExtensionKind), XamlError> {
    let schema = host.schema();
    let prefix = prefix.unwrap_or("");
    let uri = host.namespace_for_prefix(prefix).ok_or_else(|| {
        XamlError::new(
            ErrorKind::SchemaResolution,
            format!("xmlns prefix '{prefix}' is not declared"),
        )
        .with_name(name)
    })?;
    let desc = match schema.resolve_type(&uri, name) {
        Ok(desc) => desc,
        Err(err) => schema
            .resolve_type(&uri, &format!("{name}Extension"))
            .map_err(|_| XamlError::schema(err, name))?,
    };
    let kind = desc.extension_kind().ok_or_else(|| {
        eval_error(format!("'{}' is not a markup extension", desc.name)).with_name(name)
    })?;
    Ok((desc.index, kind))
}

fn build_call(host: &dyn ExtensionHost, expr: &ExtensionExpr) -> Result<ExtensionCall, XamlError> {
    let (ty, kind) = resolve_extension_type(host, expr.prefix.as_deref(), &expr.name)?;
    let mut call = ExtensionCall::new(ty, kind);
    for arg in &expr.positional {
        call.positional.push(arg_value(host, arg)?);
    }
    for (name, arg) in &expr.named {
        call.named.push((name.clone(), arg_value(host, arg)?));
    }
    Ok(call)
}

fn arg_value(host: &dyn ExtensionHost, arg: &ExprArg) -> Result<Value, XamlError> {
    match arg {
        ExprArg::Text(text) => Ok(Value::string(text.clone())),
        ExprArg::Nested(expr) => {
            let call = build_call(host, expr)?;
            match provide(host, &call, None)? {
                Evaluated::Ready(value) | Evaluated::Theme { value, .. } => Ok(value),
                Evaluated::Deferred { key, .. } => Err(eval_error(format!(
                    "resource '{key}' is not available for a nested extension"
                ))
                .with_name(key)),
            }
        }
    }
}

/// Produce the value of an evaluated call.
pub(crate) fn provide(
    host: &dyn ExtensionHost,
    call: &ExtensionCall,
    target: Option<&ExtensionTarget>,
) -> Result<Evaluated, XamlError> {
    let schema = host.schema();
    trace!(kind = ?call.kind, "provide extension value");
    match call.kind {
        ExtensionKind::StaticResource | ExtensionKind::ThemeResource => {
            let theme = call.kind == ExtensionKind::ThemeResource;
            let key = call
                .text_arg(schema, "ResourceKey")
                .ok_or_else(|| eval_error("resource reference without a key"))?;
            Ok(match host.lookup_resource(&key) {
                Some(value) if theme => Evaluated::Theme { key, value },
                Some(value) => Evaluated::Ready(value),
                None => Evaluated::Deferred { key, theme },
            })
        }
        ExtensionKind::TemplateBinding => {
            let property = call
                .text_arg(schema, "Property")
                .ok_or_else(|| eval_error("TemplateBinding without a property"))?;
            Ok(Evaluated::Ready(Value::Expression(
                Expression::TemplateBinding { property },
            )))
        }
        ExtensionKind::Binding => Ok(Evaluated::Ready(Value::Expression(Expression::Binding {
            path: call.text_arg(schema, "Path"),
            element_name: call.text_arg(schema, "ElementName"),
            mode: call.text_arg(schema, "Mode"),
        }))),
        ExtensionKind::Null => Ok(Evaluated::Ready(Value::Null)),
        ExtensionKind::Custom => {
            let name = schema.type_descriptor(call.ty).name.clone();
            let provider = host.provider(call.ty).ok_or_else(|| {
                eval_error("no provider registered for extension").with_name(name.clone())
            })?;
            provider
                .provide_value(schema, call, target)
                .map(Evaluated::Ready)
                .map_err(|e| eval_error(e).with_name(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;
    use std::collections::HashMap;
    use xaml_schema::{
        PropertyDef, Scalar, SchemaBuilder, TypeDef, TypeNamespace, XAML_NAMESPACE,
    };

    const UI: &str = "urn:ui";

    struct Host {
        schema: Arc<SchemaContext>,
        resources: HashMap<String, Value>,
        providers: HashMap<TypeIndex, Arc<dyn MarkupExtensionProvider>>,
    }

    impl ExtensionHost for Host {
        fn schema(&self) -> &SchemaContext {
            &self.schema
        }
        fn namespace_for_prefix(&self, prefix: &str) -> Option<String> {
            match prefix {
                "" => Some(UI.to_owned()),
                "x" => Some(XAML_NAMESPACE.to_owned()),
                _ => None,
            }
        }
        fn lookup_resource(&self, key: &str) -> Option<Value> {
            self.resources.get(key).cloned()
        }
        fn provider(&self, ty: TypeIndex) -> Option<Arc<dyn MarkupExtensionProvider>> {
            self.providers.get(&ty).cloned()
        }
    }

    struct Upper;

    impl MarkupExtensionProvider for Upper {
        fn provide_value(
            &self,
            schema: &SchemaContext,
            call: &ExtensionCall,
            _target: Option<&ExtensionTarget>,
        ) -> Result<Value, String> {
            call.text_arg(schema, "Text")
                .map(|t| Value::string(t.to_uppercase()))
                .ok_or_else(|| "missing Text".to_owned())
        }
    }

    fn host() -> Host {
        let mut b = SchemaBuilder::new();
        let ns = TypeNamespace::new(b.add_assembly("UI"), "UI");
        b.register_namespace(UI, &ns);
        b.register_builtin_extensions(&ns).unwrap();
        let wk = b.well_known();
        let upper = b
            .add_type(
                TypeDef::extension(&ns, "UpperExtension", ExtensionKind::Custom)
                    .with_base(wk.object)
                    .with_content_property("Text"),
            )
            .unwrap();
        b.add_property(upper, PropertyDef::new("Text", wk.string)).unwrap();
        let schema = b.build().unwrap();
        let mut resources = HashMap::new();
        resources.insert("Accent".to_owned(), Value::string("#FF0000"));
        let mut providers: HashMap<TypeIndex, Arc<dyn MarkupExtensionProvider>> = HashMap::new();
        providers.insert(upper, Arc::new(Upper));
        Host {
            schema,
            resources,
            providers,
        }
    }

    #[test]
    fn parses_positional_named_and_nested() {
        let expr = parse_extension("{Binding Path.To, Mode=TwoWay, Converter={StaticResource Conv}}")
            .unwrap();
        assert_eq!(expr.name, "Binding");
        assert_eq!(expr.positional, vec![ExprArg::Text("Path.To".into())]);
        assert_eq!(expr.named[0], ("Mode".into(), ExprArg::Text("TwoWay".into())));
        match &expr.named[1].1 {
            ExprArg::Nested(inner) => assert_eq!(inner.name, "StaticResource"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_quotes_escapes_and_prefixes() {
        let expr = parse_extension(r"{x:Null}").unwrap();
        assert_eq!(expr.prefix.as_deref(), Some("x"));
        let expr = parse_extension(r"{Upper 'a, b', Text=c\,d}").unwrap();
        assert_eq!(expr.positional, vec![ExprArg::Text("a, b".into())]);
        assert_eq!(expr.named[0].1, ExprArg::Text("c,d".into()));
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(parse_extension("{").is_err());
        assert!(parse_extension("{}").is_err());
        assert!(parse_extension("{Binding Path").is_err());
        assert!(parse_extension("{Binding} trailing").is_err());
        assert!(parse_extension("{Binding =x}").is_err());
    }

    #[test]
    fn static_resources_resolve_or_defer() {
        let host = host();
        assert_eq!(
            evaluate(&host, "{StaticResource Accent}", None).unwrap(),
            Evaluated::Ready(Value::string("#FF0000"))
        );
        assert_eq!(
            evaluate(&host, "{StaticResource ResourceKey=Later}", None).unwrap(),
            Evaluated::Deferred {
                key: "Later".into(),
                theme: false
            }
        );
        assert!(matches!(
            evaluate(&host, "{ThemeResource Accent}", None).unwrap(),
            Evaluated::Theme { .. }
        ));
    }

    #[test]
    fn builtin_expressions() {
        let host = host();
        assert_eq!(
            evaluate(&host, "{x:Null}", None).unwrap(),
            Evaluated::Ready(Value::Null)
        );
        assert_eq!(
            evaluate(&host, "{TemplateBinding Background}", None).unwrap(),
            Evaluated::Ready(Value::Expression(Expression::TemplateBinding {
                property: "Background".into()
            }))
        );
        assert_eq!(
            evaluate(&host, "{Binding Name, ElementName=source}", None).unwrap(),
            Evaluated::Ready(Value::Expression(Expression::Binding {
                path: Some("Name".into()),
                element_name: Some("source".into()),
                mode: None,
            }))
        );
    }

    #[test]
    fn custom_provider_with_nested_argument() {
        let host = host();
        assert_eq!(
            evaluate(&host, "{Upper {StaticResource Accent}}", None).unwrap(),
            Evaluated::Ready(Value::string("#FF0000"))
        );
        assert_eq!(
            evaluate(&host, "{Upper Text=abc}", None).unwrap(),
            Evaluated::Ready(Value::Scalar(Scalar::String("ABC".into())))
        );
        let err = evaluate(&host, "{Upper {StaticResource Missing}}", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExtensionEvaluation);
    }

    #[test]
    fn unknown_extension_types() {
        let host = host();
        let err = evaluate(&host, "{Nope}", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SchemaResolution);
        let err = evaluate(&host, "{x:Int32}", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExtensionEvaluation);
        let err = evaluate(&host, "{q:Null}", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SchemaResolution);
    }
}
