mod fixtures;

use std::sync::Arc;
use std::thread;

use fixtures::{CompositeInspector, HtmlWidgetBuilder, PropertyInspector, Widget, reader};
use indoc::indoc;
use metawidget_config::{Inspector, ResourceResolver, WidgetBuilder};

const COMPOSITE: &str = indoc! {r#"
    <metawidget xmlns="java:org.example">
        <compositeInspector config="CompositeInspectorConfig">
            <inspectors>
                <list>
                    <propertyInspector config="PropertyInspectorConfig">
                        <prefix><string>a:</string></prefix>
                    </propertyInspector>
                    <propertyInspector config="PropertyInspectorConfig">
                        <prefix><string>b:</string></prefix>
                    </propertyInspector>
                </list>
            </inspectors>
        </compositeInspector>
    </metawidget>
"#};

#[test]
fn identical_documents_share_one_instance() {
    let reader = reader();
    let first = reader.configure_reader::<dyn Inspector>(COMPOSITE.as_bytes()).unwrap();
    let second = reader.configure_reader::<dyn Inspector>(COMPOSITE.as_bytes()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    // Only the top-level instance is cached, not the inspectors nested inside it.
    assert_eq!(reader.cache().len(), 1);
    assert_eq!(reader.cache().documents(), 1);

    let out = second.inspect(None, "Person", &[]).unwrap();
    assert_eq!(out.as_deref(), Some("<entity type=\"a:Person\"/><entity type=\"b:Person\"/>"));
}

#[test]
fn concrete_and_interface_views_agree() {
    let reader = reader();
    let as_interface = reader.configure_reader::<dyn Inspector>(COMPOSITE.as_bytes()).unwrap();
    let as_concrete = reader
        .configure_reader::<CompositeInspector>(COMPOSITE.as_bytes())
        .unwrap();
    assert_eq!(as_concrete.inspectors.len(), 2);
    assert!(std::ptr::addr_eq(Arc::as_ptr(&as_interface), Arc::as_ptr(&as_concrete)));
}

#[test]
fn different_text_is_a_different_document() {
    let reader = reader();
    let first = reader.configure_reader::<dyn Inspector>(COMPOSITE.as_bytes()).unwrap();
    let reformatted = COMPOSITE.replace("<metawidget ", "<metawidget  ");
    let second = reader.configure_reader::<dyn Inspector>(reformatted.as_bytes()).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(reader.cache().documents(), 2);
}

#[test]
fn readers_do_not_share_caches() {
    let first = reader().configure_reader::<dyn Inspector>(COMPOSITE.as_bytes()).unwrap();
    let second = reader().configure_reader::<dyn Inspector>(COMPOSITE.as_bytes()).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn mutable_classes_are_never_cached() {
    let reader = reader();
    let xml = r#"<metawidget xmlns="java:org.example"><widget/></metawidget>"#;
    let a = reader.configure_reader::<Widget>(xml.as_bytes()).unwrap();
    let b = reader.configure_reader::<Widget>(xml.as_bytes()).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert!(reader.cache().is_empty());
}

#[test]
fn cached_entries_are_keyed_by_element_position() {
    let xml = indoc! {r#"
        <metawidget xmlns="java:org.example">
            <htmlWidgetBuilder><cssClass><string>first</string></cssClass></htmlWidgetBuilder>
            <widget><child><widget/></child></widget>
        </metawidget>
    "#};
    let reader = reader();
    let builder = reader.configure_reader::<dyn WidgetBuilder>(xml.as_bytes()).unwrap();
    let again = reader.configure_reader::<HtmlWidgetBuilder>(xml.as_bytes()).unwrap();
    assert!(std::ptr::addr_eq(Arc::as_ptr(&builder), Arc::as_ptr(&again)));
    assert_eq!(again.css_class, "first");

    // Configuring the widget from the same text leaves the cache as it was.
    reader.configure_reader::<Widget>(xml.as_bytes()).unwrap();
    assert_eq!(reader.cache().len(), 1);

    reader.cache().clear();
    let rebuilt = reader.configure_reader::<HtmlWidgetBuilder>(xml.as_bytes()).unwrap();
    assert!(!Arc::ptr_eq(&again, &rebuilt));
}

#[test]
fn concurrent_reads_converge_on_one_instance() {
    let reader = reader();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let reader = reader.clone();
            thread::spawn(move || {
                reader
                    .configure_reader::<dyn Inspector>(COMPOSITE.as_bytes())
                    .unwrap()
            })
        })
        .collect();
    let results: Vec<Arc<dyn Inspector>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let cached = reader.configure_reader::<dyn Inspector>(COMPOSITE.as_bytes()).unwrap();
    // Threads that lose the insert race hand back the winner instead of their own instance.
    assert!(results.iter().all(|r| Arc::ptr_eq(r, &cached)));
    assert_eq!(reader.cache().len(), 1);
}

#[test]
fn cached_instances_do_not_keep_the_reader_alive() {
    let reader = reader();
    reader.add_resource("org/example/messages.txt", b"hi".to_vec());
    let xml = indoc! {r#"
        <metawidget xmlns="java:org.example">
            <propertyInspector config="PropertyInspectorConfig"/>
        </metawidget>
    "#};
    let inspector = reader.configure_reader::<PropertyInspector>(xml.as_bytes()).unwrap();
    assert_eq!(reader.cache().len(), 1);

    let resolver = inspector.resolver.clone().expect("resolver injected");
    assert_eq!(resolver.open_resource("org/example/messages.txt").unwrap().bytes(), b"hi");

    drop(reader);
    // The cache went with the reader, so only this handle is left.
    assert_eq!(Arc::strong_count(&inspector), 1);
    let err = resolver.open_resource("org/example/messages.txt").unwrap_err();
    assert!(err.to_string().contains("configuration reader was dropped"), "{err}");
}
