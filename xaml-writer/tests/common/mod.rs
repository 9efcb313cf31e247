#![allow(dead_code)]

use std::sync::Arc;

use xaml_schema::{
    CollectionInfo, EnumDef, ExtensionKind, Factory, PropertyDef, PropertyIndex, Scalar,
    SchemaBuilder, SchemaContext, Setter, TypeDef, TypeIndex, TypeNamespace, XAML_NAMESPACE,
    XML_NAMESPACE,
};
use xaml_writer::{
    Construction, MemberName, ObjectGraph, ObjectId, ObjectTree, Value, VecEventSource,
    WriterSettings, XamlEvent, XamlValue, construct,
};

pub const UI: &str = "urn:demo:ui";

/// A small UI vocabulary.
pub fn schema() -> Arc<SchemaContext> {
    let mut b = SchemaBuilder::new();
    let ns = TypeNamespace::new(b.add_assembly("Demo.Ui"), "Demo.Ui");
    b.register_namespace(UI, &ns);
    b.register_builtin_extensions(&ns).unwrap();
    let wk = b.well_known();

    b.add_text_syntax("Thickness", |text| {
        let parts = text
            .split(',')
            .map(|p| p.trim().parse::<f64>().map(Scalar::Float).map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        match parts.len() {
            1 => Ok(Scalar::Composite(vec![parts[0].clone(); 4])),
            4 => Ok(Scalar::Composite(parts)),
            n => Err(format!("expected 1 or 4 lengths, got {n}")),
        }
    });
    let thickness = b
        .add_type(TypeDef::object(&ns, "Thickness").with_base(wk.object).with_text_syntax("Thickness"))
        .unwrap();
    let visibility = b
        .add_type(TypeDef::enumeration(&ns, "Visibility", EnumDef::new(["Visible", "Collapsed"])))
        .unwrap();

    let element = b.add_type(TypeDef::object(&ns, "UIElement").with_base(wk.object)).unwrap();
    b.add_property(element, PropertyDef::new("Width", wk.double)).unwrap();
    b.add_property(element, PropertyDef::new("Margin", thickness)).unwrap();
    b.add_property(element, PropertyDef::new("Visibility", visibility)).unwrap();
    b.add_property(element, PropertyDef::new("Tag", wk.object)).unwrap();
    b.add_property(
        element,
        PropertyDef::new("ActualWidth", wk.double).with_setter(Setter::ReadOnly),
    )
    .unwrap();

    let children = b
        .add_type(
            TypeDef::object(&ns, "UIElementCollection")
                .with_base(wk.object)
                .with_collection(CollectionInfo::list(Some(element))),
        )
        .unwrap();
    let panel = b
        .add_type(TypeDef::object(&ns, "Panel").with_base(element).with_content_property("Children"))
        .unwrap();
    b.add_property(panel, PropertyDef::new("Children", children).with_setter(Setter::AddOnly))
        .unwrap();
    let grid = b.add_type(TypeDef::object(&ns, "Grid").with_base(panel)).unwrap();
    b.add_property(grid, PropertyDef::new("Row", wk.int32).attached()).unwrap();

    let text_block = b
        .add_type(TypeDef::object(&ns, "TextBlock").with_base(element).with_content_property("Text"))
        .unwrap();
    b.add_property(text_block, PropertyDef::new("Text", wk.string)).unwrap();

    let brush = b
        .add_type(TypeDef::object(&ns, "Brush").with_base(wk.object).with_factory(Factory::Abstract))
        .unwrap();
    let solid = b
        .add_type(TypeDef::object(&ns, "SolidColorBrush").with_base(brush).with_content_property("Color"))
        .unwrap();
    b.add_property(solid, PropertyDef::new("Color", wk.string)).unwrap();

    let border = b
        .add_type(TypeDef::object(&ns, "Border").with_base(element).with_content_property("Child"))
        .unwrap();
    b.add_property(border, PropertyDef::new("Child", element)).unwrap();
    b.add_property(border, PropertyDef::new("Background", brush)).unwrap();

    let template = b
        .add_type(TypeDef::object(&ns, "ControlTemplate").with_base(wk.object).with_content_property("VisualTree"))
        .unwrap();
    b.add_property(template, PropertyDef::new("VisualTree", element).deferred()).unwrap();

    let button = b
        .add_type(TypeDef::object(&ns, "Button").with_base(element).with_content_property("Content"))
        .unwrap();
    b.add_property(button, PropertyDef::new("Content", wk.object)).unwrap();
    b.add_property(button, PropertyDef::new("Template", template)).unwrap();
    b.add_property(button, PropertyDef::new("Foreground", brush)).unwrap();

    let dictionary = b
        .add_type(
            TypeDef::object(&ns, "ResourceDictionary")
                .with_base(wk.object)
                .with_collection(CollectionInfo::dictionary(None)),
        )
        .unwrap();
    let page = b
        .add_type(TypeDef::object(&ns, "Page").with_base(element).with_content_property("Content"))
        .unwrap();
    b.add_property(page, PropertyDef::new("Content", element)).unwrap();
    b.add_property(page, PropertyDef::new("Resources", dictionary)).unwrap();

    let doubles = b
        .add_type(
            TypeDef::object(&ns, "DoubleCollection")
                .with_base(wk.object)
                .with_collection(CollectionInfo::list(Some(wk.double))),
        )
        .unwrap();
    let polyline = b.add_type(TypeDef::object(&ns, "Polyline").with_base(element)).unwrap();
    b.add_property(polyline, PropertyDef::new("Points", doubles)).unwrap();

    let tags = b
        .add_type(
            TypeDef::object(&ns, "TagSet")
                .with_base(wk.object)
                .with_collection(CollectionInfo::list(None).unique()),
        )
        .unwrap();
    let tagged = b.add_type(TypeDef::object(&ns, "Tagged").with_base(element)).unwrap();
    b.add_property(tagged, PropertyDef::new("Tags", tags)).unwrap();

    b.add_type(
        TypeDef::object(&ns, "WebView")
            .with_base(element)
            .with_factory(Factory::Activate("Demo.Ui.WebView".into())),
    )
    .unwrap();

    let upper = b
        .add_type(
            TypeDef::extension(&ns, "UpperExtension", ExtensionKind::Custom)
                .with_base(wk.object)
                .with_content_property("Text"),
        )
        .unwrap();
    b.add_property(upper, PropertyDef::new("Text", wk.string)).unwrap();

    b.build().unwrap()
}

pub fn ty(schema: &SchemaContext, name: &str) -> TypeIndex {
    schema.resolve_type(UI, name).unwrap().index
}

pub fn prop(schema: &SchemaContext, owner: &str, name: &str) -> PropertyIndex {
    schema.resolve_property(ty(schema, owner), name).unwrap().index
}

/// Builds event streams the way a tokenizer would emit them.
#[derive(Debug, Default, Clone)]
pub struct Doc {
    events: Vec<XamlEvent<'static>>,
}

impl Doc {
    /// A document declaring the UI namespace as default and `x`.
    pub fn new() -> Self {
        Self::bare()
            .ns("", UI)
            .ns("x", XAML_NAMESPACE)
    }

    /// A document without namespace declarations.
    pub fn bare() -> Self {
        Self::default()
    }

    pub fn ns(mut self, prefix: &str, uri: &str) -> Self {
        self.events.push(XamlEvent::Namespace {
            prefix: prefix.to_owned().into(),
            uri: uri.to_owned().into(),
        });
        self
    }

    pub fn open(self, name: &str) -> Self {
        self.open_in(UI, name)
    }

    pub fn open_in(mut self, namespace: &str, name: &str) -> Self {
        self.events
            .push(XamlEvent::start_object(namespace.to_owned(), name.to_owned()));
        self
    }

    pub fn close(mut self) -> Self {
        self.events.push(XamlEvent::EndObject);
        self
    }

    pub fn member(mut self, name: &str) -> Self {
        self.events
            .push(XamlEvent::StartMember(MemberName::local(name.to_owned())));
        self
    }

    pub fn end_member(mut self) -> Self {
        self.events.push(XamlEvent::EndMember);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.events.push(XamlEvent::text(text.to_owned()));
        self
    }

    /// `name="value"`, with extension detection.
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.events
            .push(XamlEvent::StartMember(MemberName::local(name.to_owned())));
        self.events
            .push(XamlEvent::Value(XamlValue::from_attribute(value.to_owned())));
        self.events.push(XamlEvent::EndMember);
        self
    }

    /// `x:name="value"`
    pub fn x(self, name: &str, value: &str) -> Self {
        self.qualified(XAML_NAMESPACE, name, value)
    }

    /// `xml:space="value"`
    pub fn space(self, value: &str) -> Self {
        self.qualified(XML_NAMESPACE, "space", value)
    }

    fn qualified(mut self, namespace: &str, name: &str, value: &str) -> Self {
        self.events.push(XamlEvent::StartMember(MemberName::qualified(
            namespace.to_owned(),
            name.to_owned(),
        )));
        self.events.push(XamlEvent::text(value.to_owned()));
        self.events.push(XamlEvent::EndMember);
        self
    }

    pub fn events(self) -> Vec<XamlEvent<'static>> {
        self.events
    }

    pub fn construct(self, schema: &Arc<SchemaContext>, settings: WriterSettings) -> Construction {
        let mut source = VecEventSource::from_events(self.events);
        construct(&mut source, Arc::clone(schema), settings).unwrap()
    }
}

/// Unwrap a successful construction.
pub fn complete(construction: Construction) -> ObjectTree {
    match construction {
        Construction::Complete(tree) => tree,
        other => panic!("expected complete construction, got {:?}", other.errors()),
    }
}

pub fn root(tree: &ObjectTree) -> ObjectId {
    tree.root_object().expect("root is an object")
}

pub fn object(value: Option<&Value>) -> ObjectId {
    value.and_then(Value::as_object).expect("value is an object")
}

pub fn string(value: Option<&Value>) -> &str {
    value
        .and_then(Value::as_scalar)
        .and_then(Scalar::as_str)
        .expect("value is a string scalar")
}

/// Items of a collection object.
pub fn items(graph: &ObjectGraph, id: ObjectId) -> Vec<Value> {
    graph.node(id).items.iter().map(|i| i.value.clone()).collect()
}
