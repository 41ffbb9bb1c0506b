//! Classes shared by the integration tests.
#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;

use ahash::AHashMap;
use metawidget_config::{
    ClassBuilder, ClassRef, ConfigReader, Error, Inspector, Registry, ResourceBundle, ResourceResolver,
    ResourceStream, Value, WidgetBuilder,
};

pub trait Named: Send + Sync {
    fn name(&self) -> &str;
}

#[derive(Debug, Default)]
pub struct Widget {
    pub name: String,
    pub size: Option<i32>,
    pub flag: bool,
    pub tags: Vec<String>,
    pub child: Option<Arc<Widget>>,
    pub log: Vec<String>,
    pub values: Vec<Value>,
    pub kind: Option<ClassRef>,
    pub stream: Option<ResourceStream>,
    pub bundle: Option<ResourceBundle>,
}

impl Named for Widget {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Default)]
pub struct Gadget {
    pub label: String,
}

#[derive(Default)]
pub struct PropertyInspectorConfig {
    pub prefix: String,
    pub messages: String,
    pub resolver: Option<Arc<dyn ResourceResolver>>,
}

pub struct PropertyInspector {
    pub prefix: String,
    pub messages: String,
    /// Kept for lookups after configuration.
    pub resolver: Option<Arc<dyn ResourceResolver>>,
}

impl Inspector for PropertyInspector {
    fn inspect(
        &self,
        _to_inspect: Option<&dyn Any>,
        type_name: &str,
        names: &[&str],
    ) -> metawidget_config::Result<Option<String>> {
        let mut path = type_name.to_owned();
        for name in names {
            path.push('/');
            path.push_str(name);
        }
        Ok(Some(format!("<entity type=\"{}{path}\"/>", self.prefix)))
    }
}

#[derive(Default)]
pub struct CompositeInspectorConfig {
    pub inspectors: Vec<Arc<dyn Inspector>>,
}

pub struct CompositeInspector {
    pub inspectors: Vec<Arc<dyn Inspector>>,
}

impl Inspector for CompositeInspector {
    fn inspect(
        &self,
        to_inspect: Option<&dyn Any>,
        type_name: &str,
        names: &[&str],
    ) -> metawidget_config::Result<Option<String>> {
        let mut out = String::new();
        for inspector in &self.inspectors {
            if let Some(xml) = inspector.inspect(to_inspect, type_name, names)? {
                out.push_str(&xml);
            }
        }
        Ok((!out.is_empty()).then_some(out))
    }
}

#[derive(Default)]
pub struct HtmlWidgetBuilder {
    pub css_class: String,
}

impl WidgetBuilder for HtmlWidgetBuilder {
    fn build_widget(
        &self,
        element_name: &str,
        _attributes: &AHashMap<String, String>,
    ) -> Option<Box<dyn Any>> {
        Some(Box::new(format!("<div class=\"{}\">{element_name}</div>", self.css_class)))
    }
}

/// Every fixture class, plus the `Named` interface.
pub fn registry() -> Registry {
    Registry::new()
        .with_interface::<dyn Named>("org.example.Named")
        .with(
            ClassBuilder::<Widget>::new("org.example.Widget")
                .default_constructor()
                .implements(|w: Arc<Widget>| w as Arc<dyn Named>)
                .setter("name", |w: &mut Widget, name: String| w.name = name)
                .setter("size", |w: &mut Widget, size: i32| {
                    if size < 0 {
                        return Err("size must not be negative");
                    }
                    w.size = Some(size);
                    Ok(())
                })
                .setter("flag", |w: &mut Widget, flag: bool| w.flag = flag)
                .setter("tags", |w: &mut Widget, tags: Vec<String>| w.tags = tags)
                .setter("child", |w: &mut Widget, child: Option<Arc<Widget>>| w.child = child)
                .setter("foo", |w: &mut Widget, s: String| w.log.push(format!("string:{s}")))
                .setter("foo", |w: &mut Widget, i: i32| w.log.push(format!("int:{i}")))
                .setter("pair", |w: &mut Widget, a: String, b: i32| w.log.push(format!("pair:{a}:{b}")))
                .setter("value", |w: &mut Widget, v: Value| w.values.push(v))
                .setter("kind", |w: &mut Widget, kind: Option<ClassRef>| w.kind = kind)
                .setter("stream", |w: &mut Widget, s: ResourceStream| w.stream = Some(s))
                .setter("bundle", |w: &mut Widget, b: ResourceBundle| w.bundle = Some(b)),
        )
        .with(
            ClassBuilder::<Gadget>::new("org.example.Gadget")
                .default_constructor()
                .setter("label", |g: &mut Gadget, label: String| g.label = label),
        )
        .with(
            ClassBuilder::<PropertyInspectorConfig>::new("org.example.PropertyInspectorConfig")
                .default_constructor()
                .needs_resource_resolver(|c: &mut PropertyInspectorConfig, resolver| c.resolver = Some(resolver))
                .setter("prefix", |c: &mut PropertyInspectorConfig, prefix: String| c.prefix = prefix)
                .setter(
                    "messages",
                    |c: &mut PropertyInspectorConfig, name: String| -> Result<(), Error> {
                        let resolver = c
                            .resolver
                            .as_ref()
                            .ok_or_else(|| Error::invocation("no resource resolver"))?;
                        let stream = resolver.open_resource(&name)?;
                        c.messages = String::from_utf8_lossy(stream.bytes()).into_owned();
                        Ok(())
                    },
                ),
        )
        .with(
            ClassBuilder::<PropertyInspector>::new("org.example.PropertyInspector")
                .config_constructor(|c: PropertyInspectorConfig| PropertyInspector {
                    prefix: c.prefix,
                    messages: c.messages,
                    resolver: c.resolver,
                })
                .inspector(),
        )
        .with(
            ClassBuilder::<CompositeInspectorConfig>::new("org.example.CompositeInspectorConfig")
                .default_constructor()
                .setter(
                    "inspectors",
                    |c: &mut CompositeInspectorConfig, inspectors: Vec<Arc<dyn Inspector>>| c.inspectors = inspectors,
                ),
        )
        .with(
            ClassBuilder::<CompositeInspector>::new("org.example.CompositeInspector")
                .config_constructor(|c: CompositeInspectorConfig| CompositeInspector {
                    inspectors: c.inspectors,
                })
                .inspector(),
        )
        .with(
            ClassBuilder::<HtmlWidgetBuilder>::new("org.example.HtmlWidgetBuilder")
                .default_constructor()
                .widget_builder()
                .setter("cssClass", |b: &mut HtmlWidgetBuilder, css: String| b.css_class = css),
        )
}

/// A reader over [`registry`] that renders plain error messages and never touches the filesystem.
pub fn reader() -> ConfigReader {
    ConfigReader::with_options(
        registry(),
        metawidget_config::options! {
            with_snippet: false,
            resource_roots: Vec::new(),
        },
    )
}
