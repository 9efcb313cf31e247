use std::sync::Arc;

use facet_testhelpers::test;
use indoc::indoc;
use xaml_node::{Element, ElementSourceError, diagnostics, from_element, to_element};
use xaml_schema::{
    CollectionInfo, PropertyDef, SchemaBuilder, SchemaContext, Setter, TypeDef, TypeNamespace,
    XAML_NAMESPACE,
};
use xaml_writer::{ConstructError, Construction, ErrorKind, ObjectTree, Value, WriterSettings};

const UI: &str = "urn:demo:ui";

fn schema() -> Arc<SchemaContext> {
    let mut b = SchemaBuilder::new();
    let ns = TypeNamespace::new(b.add_assembly("Demo.Ui"), "Demo.Ui");
    b.register_namespace(UI, &ns);
    b.register_builtin_extensions(&ns).unwrap();
    let wk = b.well_known();

    let element = b.add_type(TypeDef::object(&ns, "UIElement").with_base(wk.object)).unwrap();
    b.add_property(element, PropertyDef::new("Width", wk.double)).unwrap();
    b.add_property(element, PropertyDef::new("Tag", wk.object)).unwrap();
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
        .add_type(TypeDef::object(&ns, "SolidColorBrush").with_base(wk.object).with_content_property("Color"))
        .unwrap();
    b.add_property(brush, PropertyDef::new("Color", wk.string)).unwrap();

    let template = b
        .add_type(TypeDef::object(&ns, "ControlTemplate").with_base(wk.object).with_content_property("VisualTree"))
        .unwrap();
    b.add_property(template, PropertyDef::new("VisualTree", element).deferred()).unwrap();
    let button = b.add_type(TypeDef::object(&ns, "Button").with_base(element)).unwrap();
    b.add_property(button, PropertyDef::new("Template", template)).unwrap();

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
    b.build().unwrap()
}

/// A root element declaring the default and `x` namespaces.
fn root(tag: &str) -> Element {
    Element::new(tag)
        .with_attr("xmlns", UI)
        .with_attr("xmlns:x", XAML_NAMESPACE)
}

fn build(element: &Element, schema: &Arc<SchemaContext>) -> ObjectTree {
    match from_element(element, Arc::clone(schema), WriterSettings::new()).unwrap() {
        Construction::Complete(tree) => tree,
        other => panic!("expected complete construction, got {:?}", other.errors()),
    }
}

#[test]
fn page_with_resources_and_attached_properties() {
    let schema = schema();
    let page = root("Page")
        .with_attr("x:Name", "root")
        .with_child(
            Element::new("Page.Resources").with_child(
                Element::new("SolidColorBrush")
                    .with_attr("x:Key", "Accent")
                    .with_text("Red"),
            ),
        )
        .with_child(
            Element::new("Grid")
                .with_attr("Width", "Auto")
                .with_child(
                    Element::new("TextBlock")
                        .with_attr("Grid.Row", "1")
                        .with_attr("Tag", "{StaticResource Accent}")
                        .with_text("Hello"),
                )
                .with_child(
                    Element::new("TextBlock")
                        .with_attr("Tag", "{Binding Title}")
                        .with_attr("x:Name", "second")
                        .with_text("World"),
                ),
        );

    let tree = build(&page, &schema);
    assert_eq!(
        to_element(&tree, &schema).to_markup(),
        indoc! {r#"
            <Page x:Name="root">
              <Page.Resources>
                <ResourceDictionary>
                  <SolidColorBrush x:Key="Accent" Color="Red"/>
                </ResourceDictionary>
              </Page.Resources>
              <Page.Content>
                <Grid Width="Auto">
                  <Grid.Children>
                    <UIElementCollection>
                      <TextBlock Grid.Row="1" Text="Hello">
                        <TextBlock.Tag>
                          <SolidColorBrush Color="Red"/>
                        </TextBlock.Tag>
                      </TextBlock>
                      <TextBlock x:Name="second" Tag="{Binding Title}" Text="World"/>
                    </UIElementCollection>
                  </Grid.Children>
                </Grid>
              </Page.Content>
            </Page>
        "#}
    );
}

fn templated_panel() -> Element {
    root("Panel")
        .with_child(
            Element::new("Button").with_attr("x:Name", "b").with_child(
                Element::new("Button.Template").with_child(
                    Element::new("ControlTemplate").with_child(
                        Element::new("TextBlock")
                            .with_attr("Tag", "{TemplateBinding Tag}")
                            .with_text("Hi"),
                    ),
                ),
            ),
        )
        .with_child(
            Element::new("TextBlock")
                .with_attr("x:Name", "lazy")
                .with_attr("x:Load", "False")
                .with_text("Later"),
        )
}

#[test]
fn templates_and_deferred_elements_are_placeholders() {
    let schema = schema();
    let tree = build(&templated_panel(), &schema);
    assert_eq!(
        to_element(&tree, &schema).to_markup(),
        indoc! {r#"
            <Panel>
              <Panel.Children>
                <UIElementCollection>
                  <Button x:Name="b">
                    <Button.Template>
                      <ControlTemplate>
                        <ControlTemplate.VisualTree>
                          <x:Template Events="6"/>
                        </ControlTemplate.VisualTree>
                      </ControlTemplate>
                    </Button.Template>
                  </Button>
                </UIElementCollection>
              </Panel.Children>
              <x:Deferred Names="lazy"/>
            </Panel>
        "#}
    );
}

#[test]
fn loaded_template_content_renders_like_inline_markup() {
    let schema = schema();
    let tree = build(&templated_panel(), &schema);
    let template = tree
        .graph
        .iter()
        .find_map(|(_, node)| {
            node.properties.iter().find_map(|(_, value)| match value {
                Value::Template(t) => Some(t.clone()),
                _ => None,
            })
        })
        .unwrap();
    let Construction::Complete(instance) = template.0.load_content() else {
        panic!("template content loads");
    };
    assert_eq!(
        to_element(&instance, &schema).to_markup(),
        "<TextBlock Tag=\"{TemplateBinding Tag}\" Text=\"Hi\"/>\n"
    );
}

#[test]
fn diagnostics_render_per_error() {
    let schema = schema();
    let page = root("Panel")
        .with_child(Element::new("Nope"))
        .with_child(Element::new("TextBlock").with_attr("Width", "wide"));
    let Construction::Partial(_, errors) =
        from_element(&page, Arc::clone(&schema), WriterSettings::new()).unwrap()
    else {
        panic!("expected partial construction");
    };
    let dump = diagnostics(&errors);
    let kinds: Vec<_> = dump
        .child_elements()
        .map(|e| e.get_attr("kind").unwrap_or_default().to_owned())
        .collect();
    assert_eq!(kinds, ["SchemaResolution", "ValueConversion"]);
    assert_eq!(errors[1].kind, ErrorKind::ValueConversion);
}

#[test]
fn malformed_markup_is_a_source_error() {
    let schema = schema();
    let result = from_element(&Element::new("Page"), schema, WriterSettings::new());
    assert!(matches!(
        result,
        Err(ConstructError::Source(ElementSourceError::UndeclaredPrefix { .. }))
    ));
}
