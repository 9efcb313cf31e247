mod common;

use std::sync::Arc;
use std::thread;

use common::{Doc, complete, items, object, prop, root, schema, string, ty};
use facet_testhelpers::test;
use xaml_schema::SchemaContext;
use xaml_writer::{
    Construction, ErrorKind, NameLookup, NameScope, ObjectTree, ObjectWriter, TemplateBindingRecord,
    Value, WriterSettings,
};

/// A button whose template holds a named border bound to the button's tag.
fn templated_button(schema: &Arc<SchemaContext>) -> ObjectTree {
    complete(
        Doc::new()
            .open("Button")
            .x("Name", "host")
            .member("Template")
            .open("ControlTemplate")
            .open("Border")
            .x("Name", "chrome")
            .attr("Tag", "{TemplateBinding Tag}")
            .open("TextBlock")
            .x("Name", "label")
            .text("inside")
            .close()
            .close()
            .close()
            .end_member()
            .close()
            .construct(schema, WriterSettings::new()),
    )
}

#[test]
fn templates_are_recorded_not_built() {
    let schema = schema();
    let tree = templated_button(&schema);
    // Button and ControlTemplate only.
    assert_eq!(tree.graph.len(), 2);
    assert!(tree.name_scope.contains("host"));
    assert!(!tree.name_scope.contains("chrome"));
    assert_eq!(tree.name_scope.find_name("label"), NameLookup::NotFound);
    assert!(tree.graph.template_bindings().is_empty());
}

#[test]
fn each_load_builds_a_fresh_instance() {
    let schema = schema();
    let tree = templated_button(&schema);
    let button = tree.graph.node(root(&tree));
    let template = object(button.get(prop(&schema, "Button", "Template")));
    let Some(Value::Template(content)) = tree
        .graph
        .node(template)
        .get(prop(&schema, "ControlTemplate", "VisualTree"))
    else {
        panic!("VisualTree holds recorded content");
    };

    let first = complete(content.0.load_content());
    let second = complete(content.0.load_content());
    let (a, b) = (root(&first), root(&second));
    assert!(first.graph.same_shape(a, &second.graph, b));
    assert!(!Arc::ptr_eq(&first.name_scope, &second.name_scope));

    let border = first.graph.node(a);
    assert_eq!(border.ty, Some(ty(&schema, "Border")));
    assert_eq!(first.name_scope.find_name("chrome"), NameLookup::Document(a));
    let label = object(border.get(prop(&schema, "Border", "Child")));
    assert_eq!(
        string(first.graph.node(label).get(prop(&schema, "TextBlock", "Text"))),
        "inside"
    );
    assert_eq!(
        first.graph.template_bindings(),
        [TemplateBindingRecord {
            target: a,
            property: prop(&schema, "UIElement", "Tag"),
            source: "Tag".into(),
        }]
    );
}

fn deferred_doc(load: bool) -> Doc {
    let doc = Doc::new()
        .open("Panel")
        .x("Name", "panel")
        .open("TextBlock")
        .text("always")
        .close()
        .open("Border")
        .x("Name", "later");
    let doc = if load { doc } else { doc.x("Load", "False") };
    doc.attr("Width", "12")
        .open("TextBlock")
        .x("Name", "nested")
        .text("on demand")
        .close()
        .close()
        .close()
}

#[test]
fn unloaded_elements_are_registered_but_not_built() {
    let schema = schema();
    let tree = complete(deferred_doc(false).construct(&schema, WriterSettings::new()));
    let panel = tree.graph.node(root(&tree));
    let children = items(&tree.graph, object(panel.get(prop(&schema, "Panel", "Children"))));
    assert_eq!(children.len(), 1);

    let placeholders = tree.graph.deferred_elements();
    assert_eq!(placeholders.len(), 1);
    assert_eq!(placeholders[0].names, ["later", "nested"]);
    assert_eq!(placeholders[0].property, Some(prop(&schema, "Panel", "Children")));
    assert!(!placeholders[0].creator.is_realized());
    assert!(tree.name_scope.contains("later"));
}

#[test]
fn find_name_realizes_once() {
    let schema = schema();
    let tree = complete(deferred_doc(false).construct(&schema, WriterSettings::new()));

    let NameLookup::Element(first) = tree.name_scope.find_name("later") else {
        panic!("deferred element realizes on lookup");
    };
    let creator = &tree.graph.deferred_elements()[0].creator;
    assert!(creator.is_realized());
    assert!(creator.errors().is_empty());

    let NameLookup::Element(again) = tree.name_scope.find_name("later") else {
        panic!("realized element stays reachable");
    };
    assert_eq!(first, again);
    let (from_creator, retry) = creator.try_get_or_create_element();
    assert_eq!(from_creator, Some(first.clone()));
    assert!(!retry);

    let NameLookup::Element(nested) = tree.name_scope.find_name("nested") else {
        panic!("names inside the element resolve through it");
    };
    assert!(Arc::ptr_eq(nested.graph(), first.graph()));
    assert_eq!(nested.node().ty, Some(ty(&schema, "TextBlock")));
}

#[test]
fn realized_elements_match_inline_construction() {
    let schema = schema();
    let inline = complete(deferred_doc(true).construct(&schema, WriterSettings::new()));
    let NameLookup::Document(border) = inline.name_scope.find_name("later") else {
        panic!("inline element is in the document");
    };

    let deferred = complete(deferred_doc(false).construct(&schema, WriterSettings::new()));
    let NameLookup::Element(realized) = deferred.name_scope.find_name("later") else {
        panic!("deferred element realizes on lookup");
    };
    assert!(inline.graph.same_shape(border, realized.graph(), realized.id()));
}

#[test]
fn concurrent_lookups_share_one_element() {
    let schema = schema();
    let tree = complete(deferred_doc(false).construct(&schema, WriterSettings::new()));
    let scope = &tree.name_scope;

    let found: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(move || loop {
                    match scope.find_name("later") {
                        NameLookup::Pending => thread::yield_now(),
                        other => break other,
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("lookup thread"))
            .collect()
    });
    let NameLookup::Element(first) = &found[0] else {
        panic!("expected a realized element, got {:?}", found[0]);
    };
    assert!(found.iter().all(|f| f == &NameLookup::Element(first.clone())));
}

#[test]
fn deferral_needs_a_name_and_a_parent() {
    let schema = schema();
    let construction = Doc::new()
        .open("Panel")
        .open("Border")
        .x("Load", "False")
        .close()
        .close()
        .construct(&schema, WriterSettings::new());
    let Construction::Partial(tree, errors) = construction else {
        panic!("expected partial construction");
    };
    assert_eq!(errors[0].kind, ErrorKind::Assignment);
    assert!(tree.graph.deferred_elements().is_empty());

    let construction = Doc::new()
        .open("Border")
        .x("Name", "top")
        .x("Load", "False")
        .close()
        .construct(&schema, WriterSettings::new());
    let Construction::Partial(tree, errors) = construction else {
        panic!("expected partial construction");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Assignment);
    // The root is built normally.
    assert_eq!(tree.name_scope.find_name("top"), NameLookup::Document(root(&tree)));
}

#[test]
fn lazy_strategy_also_defers() {
    let schema = schema();
    let tree = complete(
        Doc::new()
            .open("Panel")
            .open("Border")
            .x("Name", "lazy")
            .x("DeferLoadStrategy", "Lazy")
            .close()
            .close()
            .construct(&schema, WriterSettings::new()),
    );
    assert_eq!(tree.graph.deferred_elements().len(), 1);
    assert!(matches!(tree.name_scope.find_name("lazy"), NameLookup::Element(_)));
}

#[test]
fn captured_context_resumes_construction() {
    let schema = schema();
    let mut writer = ObjectWriter::new(Arc::clone(&schema), WriterSettings::new());
    let head = Doc::new()
        .open("Page")
        .member("Resources")
        .open("SolidColorBrush")
        .x("Key", "Accent")
        .text("Red")
        .close()
        .end_member()
        .member("Content");
    for event in head.events() {
        writer.write(event).unwrap();
    }
    let saved = writer.capture();
    assert_eq!(saved.depth(), 1);
    assert!(saved.resources().contains_key("Accent"));

    let scope = Arc::new(NameScope::new());
    let mut resumed = ObjectWriter::resume(&saved, Arc::clone(&scope));
    let tail = Doc::bare()
        .open("Border")
        .x("Name", "resumed")
        .attr("Tag", "{StaticResource Accent}")
        .close();
    for event in tail.events() {
        resumed.write(event).unwrap();
    }
    let tree = complete(resumed.finish());
    let border = tree.graph.node(root(&tree));
    assert_eq!(border.ty, Some(ty(&schema, "Border")));
    assert!(matches!(
        border.get(prop(&schema, "UIElement", "Tag")),
        Some(Value::Element(brush)) if brush.node().ty == Some(ty(&schema, "SolidColorBrush"))
    ));
    assert_eq!(scope.find_name("resumed"), NameLookup::Document(root(&tree)));
    assert!(scope.is_sealed());
}
