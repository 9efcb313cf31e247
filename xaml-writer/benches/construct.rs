use std::sync::Arc;

use divan::{Bencher, black_box};
use xaml_schema::{
    CollectionInfo, PropertyDef, SchemaBuilder, SchemaContext, Setter, TypeDef, TypeNamespace,
    XAML_NAMESPACE,
};
use xaml_writer::{
    MemberName, Value, VecEventSource, WriterSettings, XamlEvent, XamlValue, construct,
};

fn main() {
    divan::main();
}

const UI: &str = "urn:bench:ui";

fn schema() -> Arc<SchemaContext> {
    let mut b = SchemaBuilder::new();
    let ns = TypeNamespace::new(b.add_assembly("Bench"), "Bench");
    b.register_namespace(UI, &ns);
    b.register_builtin_extensions(&ns).unwrap();
    let wk = b.well_known();

    let element = b.add_type(TypeDef::object(&ns, "Element").with_base(wk.object)).unwrap();
    b.add_property(element, PropertyDef::new("Width", wk.double)).unwrap();
    b.add_property(element, PropertyDef::new("Tag", wk.object)).unwrap();
    let list = b
        .add_type(
            TypeDef::object(&ns, "ElementCollection")
                .with_base(wk.object)
                .with_collection(CollectionInfo::list(Some(element))),
        )
        .unwrap();
    let panel = b
        .add_type(TypeDef::object(&ns, "Panel").with_base(element).with_content_property("Children"))
        .unwrap();
    b.add_property(panel, PropertyDef::new("Children", list).with_setter(Setter::AddOnly))
        .unwrap();
    let label = b
        .add_type(TypeDef::object(&ns, "Label").with_base(element).with_content_property("Text"))
        .unwrap();
    b.add_property(label, PropertyDef::new("Text", wk.string)).unwrap();
    b.build().unwrap()
}

/// A panel of `n` labels, every other one named and using a resource.
fn document(n: usize) -> Vec<XamlEvent<'static>> {
    let mut events = vec![
        XamlEvent::Namespace {
            prefix: "".into(),
            uri: UI.into(),
        },
        XamlEvent::Namespace {
            prefix: "x".into(),
            uri: XAML_NAMESPACE.into(),
        },
        XamlEvent::start_object(UI, "Panel"),
    ];
    for i in 0..n {
        events.push(XamlEvent::start_object(UI, "Label"));
        if i % 2 == 0 {
            events.push(XamlEvent::StartMember(MemberName::qualified(XAML_NAMESPACE, "Name")));
            events.push(XamlEvent::text(format!("label{i}")));
            events.push(XamlEvent::EndMember);
            events.push(XamlEvent::StartMember(MemberName::local("Tag")));
            events.push(XamlEvent::Value(XamlValue::from_attribute("{StaticResource Shared}")));
            events.push(XamlEvent::EndMember);
        }
        events.push(XamlEvent::StartMember(MemberName::local("Width")));
        events.push(XamlEvent::text(format!("{}.5", i % 300)));
        events.push(XamlEvent::EndMember);
        events.push(XamlEvent::text(format!("Label number {i}")));
        events.push(XamlEvent::EndObject);
    }
    events.push(XamlEvent::EndObject);
    events
}

fn settings() -> WriterSettings {
    WriterSettings::new().resources(Arc::new(|key: &str| {
        (key == "Shared").then(|| Value::string("shared"))
    }))
}

#[divan::bench(args = [10, 100, 1000])]
fn construct_panel(bencher: Bencher, n: usize) {
    let schema = schema();
    let events = document(n);
    bencher.bench(|| {
        let mut source = VecEventSource::from_events(events.clone());
        black_box(construct(&mut source, Arc::clone(&schema), settings()).unwrap())
    });
}

#[divan::bench]
fn resolve_cached_types(bencher: Bencher) {
    let schema = schema();
    bencher.bench(|| {
        for name in ["Panel", "Label", "Element", "ElementCollection"] {
            black_box(schema.resolve_type(black_box(UI), black_box(name)).ok());
        }
    });
}
