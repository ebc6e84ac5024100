use knob_params::{
    ConfigFile, ConfigScope, ConfigurablePlugin, Parameter, ParameterError, ParameterSpec,
    PendingHandle, PluginConfig, PluginHost, PluginParameters, StaticParameter,
    StaticParameterGraph, StaticParameterGroup, StaticParameterSpec,
};
use knob_runtime::{ComponentId, ElementKind, Runtime};
use knob_test_utils::{
    add_structuring_group, add_module, add_recorded, config_tree, runtime_with_args,
    temp_config_file, RecordingComponent,
};
use knob_tree::ConfigTree;
use knob_value::{DataType, InputStream, OutputStream, TypedValue};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn exposure_spec() -> ParameterSpec<i32> {
    ParameterSpec::new("exposure")
        .default_value(1)
        .config_entry("exposure")
        .command_line_option("exposure")
        .tool_default("9")
}

/// Runtime with a config file at the root and a scoped `cam` module
fn camera_runtime(arguments: &[(&str, &str)], entries: &[(&str, &str)]) -> (Runtime, ComponentId) {
    let rt = runtime_with_args(arguments);
    let file = ConfigFile::empty().attach(&rt, rt.root());
    file.append_tree(&config_tree(entries));
    let (cam, _) = add_module(&rt, rt.root(), "cam");
    ConfigScope::set(&rt, cam, "cam");
    (rt, cam)
}

// ----- runtime parameter sources -----

#[test]
fn test_command_line_beats_config_and_tool_default() {
    let (rt, cam) = camera_runtime(&[("exposure", "5")], &[("/cam/exposure", "7")]);
    let exposure = Parameter::create(&rt, cam, &exposure_spec()).unwrap();
    rt.init(rt.root());
    assert_eq!(exposure.get(), 5);
}

#[test]
fn test_config_entry_beats_tool_default() {
    let (rt, cam) = camera_runtime(&[], &[("/cam/exposure", "7")]);
    let exposure = Parameter::create(&rt, cam, &exposure_spec()).unwrap();
    rt.init(rt.root());
    assert_eq!(exposure.get(), 7);
}

#[test]
fn test_tool_default_applies_without_other_sources() {
    let (rt, cam) = camera_runtime(&[], &[]);
    let exposure = Parameter::create(&rt, cam, &exposure_spec()).unwrap();
    rt.init(rt.root());
    assert_eq!(exposure.get(), 9);
}

#[test]
fn test_hard_coded_default_without_any_source() {
    let (rt, cam) = camera_runtime(&[], &[]);
    let exposure = Parameter::create(
        &rt,
        cam,
        &ParameterSpec::new("exposure").default_value(1).config_entry("exposure"),
    )
    .unwrap();
    rt.init(rt.root());
    assert_eq!(exposure.get(), 1);
}

#[test]
fn test_unparsable_command_line_falls_through_to_config() {
    let (rt, cam) = camera_runtime(&[("exposure", "bright")], &[("/cam/exposure", "7")]);
    let exposure = Parameter::create(&rt, cam, &exposure_spec()).unwrap();
    rt.init(rt.root());
    assert_eq!(exposure.get(), 7);
}

#[test]
fn test_changing_config_entry_of_ready_parameter_reloads() {
    let (rt, cam) = camera_runtime(&[], &[("/cam/exposure", "7"), ("/cam/other", "11")]);
    let exposure = Parameter::create(&rt, cam, &exposure_spec()).unwrap();
    rt.init(rt.root());

    exposure.set_config_entry(&rt, "other");
    assert_eq!(exposure.config_entry(), "other");
    assert_eq!(exposure.get(), 11);
}

// ----- scopes -----

#[test]
fn test_nested_scopes_address_absolute_entry() {
    let rt = Runtime::new();
    let file = ConfigFile::empty().attach(&rt, rt.root());
    file.append_tree(&config_tree(&[("/root/a/b/x", "42")]));
    let outer = rt.create_element(rt.root(), "outer", ElementKind::Group, None).unwrap();
    let (inner, _) = add_module(&rt, outer, "inner");
    ConfigScope::set(&rt, outer, "/root");
    ConfigScope::set(&rt, inner, "a/b");

    let x = Parameter::create(
        &rt,
        inner,
        &ParameterSpec::new("x").default_value(0i64).config_entry("x"),
    )
    .unwrap();
    rt.init(rt.root());

    assert_eq!(ConfigScope::full_config_entry(&rt, x.element(), "x"), "/root/a/b/x");
    assert_eq!(x.get(), 42);
}

#[test]
fn test_changing_scope_of_ready_element_reloads_parameters() {
    let (rt, cam) = camera_runtime(&[], &[("/cam/exposure", "7"), ("/spare/exposure", "3")]);
    let exposure = Parameter::create(
        &rt,
        cam,
        &ParameterSpec::new("exposure").default_value(1).config_entry("exposure"),
    )
    .unwrap();
    rt.init(rt.root());
    assert_eq!(exposure.get(), 7);

    ConfigScope::set(&rt, cam, "spare");
    assert_eq!(exposure.get(), 3);
}

// ----- config file persistence -----

#[test]
fn test_save_skips_defaults_without_entry() {
    let (_dir, path) = temp_config_file("params.json", &[("/cam/gain", "3")]);
    let rt = Runtime::new();
    let file = ConfigFile::open(path.to_str().unwrap()).attach(&rt, rt.root());
    let (cam, _) = add_module(&rt, rt.root(), "cam");
    ConfigScope::set(&rt, cam, "cam");
    let gain = Parameter::create(
        &rt,
        cam,
        &ParameterSpec::new("gain").default_value(1).config_entry("gain"),
    )
    .unwrap();
    let exposure = Parameter::create(
        &rt,
        cam,
        &ParameterSpec::new("exposure").default_value(10).config_entry("exposure"),
    )
    .unwrap();
    rt.init(rt.root());
    assert_eq!(gain.get(), 3);

    file.save_file(&rt, None).unwrap();
    let saved = ConfigTree::load(&path).unwrap();
    assert_eq!(saved.string_entry("/cam/gain"), "3");
    assert!(!saved.has_entry("/cam/exposure"));

    exposure.set(20).unwrap();
    file.save_file(&rt, None).unwrap();
    let first = std::fs::read_to_string(&path).unwrap();
    file.save_file(&rt, None).unwrap();
    let second = std::fs::read_to_string(&path).unwrap();
    assert_eq!(first, second);
    assert_eq!(ConfigTree::load(&path).unwrap().string_entry("/cam/exposure"), "20");
}

#[test]
fn test_save_under_new_filename_and_reload() {
    let (dir, path) = temp_config_file("params.yaml", &[("/cam/gain", "4")]);
    let rt = Runtime::new();
    let file = ConfigFile::open(path.to_str().unwrap()).attach(&rt, rt.root());
    let (cam, _) = add_module(&rt, rt.root(), "cam");
    ConfigScope::set(&rt, cam, "cam");
    let gain = Parameter::create(
        &rt,
        cam,
        &ParameterSpec::new("gain").default_value(1).config_entry("gain"),
    )
    .unwrap();
    rt.init(rt.root());
    gain.set(8).unwrap();

    let copy = dir.path().join("copy.json");
    let written = file.save_file(&rt, copy.to_str()).unwrap();
    assert_eq!(written, copy);
    assert_eq!(file.filename(), copy.to_str().unwrap());

    let rt2 = Runtime::new();
    ConfigFile::open(copy.to_str().unwrap()).attach(&rt2, rt2.root());
    let (cam2, _) = add_module(&rt2, rt2.root(), "cam");
    ConfigScope::set(&rt2, cam2, "cam");
    let gain2 = Parameter::create(
        &rt2,
        cam2,
        &ParameterSpec::new("gain").default_value(1).config_entry("gain"),
    )
    .unwrap();
    rt2.init(rt2.root());
    assert_eq!(gain2.get(), 8);
}

#[test]
fn test_config_file_stream_round_trip() {
    let rt = Runtime::new();
    let file = ConfigFile::empty().attach(&rt, rt.root());
    file.append_tree(&config_tree(&[("/cam/gain", "3")]));

    let mut out = OutputStream::new();
    file.write_to(&mut out).unwrap();

    let copy = ConfigFile::empty();
    copy.read_from(&mut InputStream::from(out)).unwrap();
    assert_eq!(copy.string_entry("/cam/gain"), "3");
}

// ----- static parameters -----

#[test]
fn test_shared_change_reconfigures_each_group_once() {
    let rt = Runtime::new();
    let (fg, fg_component) = add_recorded(
        &rt,
        rt.root(),
        "tool",
        ElementKind::StructuringGroup,
        RecordingComponent::new(),
    );
    let (module, module_component) = add_module(&rt, fg, "m");
    let shared = StaticParameter::declare(
        &rt,
        fg,
        StaticParameterSpec::new("width").default_value(1),
    )
    .unwrap();
    let inner = StaticParameter::<i32>::declare(
        &rt,
        module,
        StaticParameterSpec::new("w").attach_outer("width", false),
    )
    .unwrap();

    rt.init(rt.root());
    assert_eq!(fg_component.reconfigurations(), 1);
    assert_eq!(module_component.reconfigurations(), 1);
    assert_eq!(inner.get(), 1);

    shared.set(5).unwrap();
    StaticParameterGroup::evaluate(&rt, fg);
    assert_eq!(fg_component.reconfigurations(), 2);
    assert_eq!(module_component.reconfigurations(), 2);
    assert_eq!(inner.get(), 5);
    assert!(!inner.has_changed());

    StaticParameterGroup::evaluate(&rt, fg);
    assert_eq!(fg_component.reconfigurations(), 2);
    assert_eq!(module_component.reconfigurations(), 2);
}

#[test]
fn test_reconfiguration_hook_children_get_initialized() {
    let rt = Runtime::new();
    let spawned = std::sync::Arc::new(Mutex::new(Vec::new()));
    let sink = spawned.clone();
    let (module, _) = add_recorded(
        &rt,
        rt.root(),
        "m",
        ElementKind::Module,
        RecordingComponent::with_reconfigure_hook(move |runtime, id| {
            let name = format!("child{}", sink.lock().len());
            if let Ok(child) = runtime.create_element(id, &name, ElementKind::Module, None) {
                sink.lock().push(child);
            }
        }),
    );
    let count = StaticParameter::declare(
        &rt,
        module,
        StaticParameterSpec::new("count").default_value(1),
    )
    .unwrap();
    rt.init(rt.root());

    count.set(2).unwrap();
    StaticParameterGroup::evaluate(&rt, module);
    let children = spawned.lock().clone();
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|c| rt.is_ready(*c)));
}

#[test]
fn test_static_config_entry_and_command_line_gating() {
    let rt = runtime_with_args(&[("depth", "8")]);
    let file = ConfigFile::empty().attach(&rt, rt.root());
    file.append_tree(&config_tree(&[("/depth", "3")]));
    let outer = add_structuring_group(&rt, rt.root(), "outer");
    let nested = add_structuring_group(&rt, outer, "nested");
    let (top_module, _) = add_module(&rt, outer, "top");
    let (deep_module, _) = add_module(&rt, nested, "deep");

    let spec = || {
        StaticParameterSpec::new("depth")
            .default_value(0)
            .command_line_option("depth")
            .config_entry("/depth")
    };
    let top = StaticParameter::declare(&rt, top_module, spec()).unwrap();
    let deep = StaticParameter::declare(&rt, deep_module, spec()).unwrap();
    rt.init(rt.root());

    assert_eq!(top.get(), 8);
    assert_eq!(deep.get(), 3);
}

#[test]
fn test_missing_outer_parameter_is_created_as_proxy() {
    let rt = Runtime::new();
    let fg = add_structuring_group(&rt, rt.root(), "tool");
    let (first, _) = add_module(&rt, fg, "first");
    let (second, _) = add_module(&rt, fg, "second");

    let a = StaticParameter::declare(
        &rt,
        first,
        StaticParameterSpec::new("a").default_value(4).attach_outer("shared", true),
    )
    .unwrap();
    let outer = StaticParameterGroup::of(&rt, fg).unwrap();
    let proxy = outer.find("shared").unwrap();
    let graph = StaticParameterGraph::of(&rt);
    assert!(graph.is_proxy(proxy));
    assert_eq!(graph.buffer_owner(a.id()), Some(proxy));
    assert_eq!(graph.with_value(proxy, |v| v.to_text()), Some("4".to_string()));

    let b = StaticParameter::declare(
        &rt,
        second,
        StaticParameterSpec::new("b").default_value(2).attach_outer("shared", false),
    )
    .unwrap();
    assert_eq!(b.get(), 4);
    b.set(9).unwrap();
    assert_eq!(a.get(), 9);
    assert_eq!(outer.len(), 1);
}

#[test]
fn test_deleting_owner_element_keeps_attached_values() {
    let rt = Runtime::new();
    let (owner_module, _) = add_module(&rt, rt.root(), "owner");
    let (user_module, _) = add_module(&rt, rt.root(), "user");
    let owner = StaticParameter::declare(
        &rt,
        owner_module,
        StaticParameterSpec::new("o").default_value(6),
    )
    .unwrap();
    let user = StaticParameter::declare(
        &rt,
        user_module,
        StaticParameterSpec::new("u").default_value(0),
    )
    .unwrap();
    user.attach_to(&owner).unwrap();

    rt.delete(owner_module).unwrap();
    let graph = StaticParameterGraph::of(&rt);
    assert!(!graph.contains(owner.id()));
    assert_eq!(graph.buffer_owner(user.id()), Some(user.id()));
    assert_eq!(user.get(), 6);
}

#[test]
fn test_handle_of_deleted_element_does_not_reach_new_parameter() {
    let rt = Runtime::new();
    let (first, _) = add_module(&rt, rt.root(), "first");
    let (second, _) = add_module(&rt, rt.root(), "second");
    let old = StaticParameter::declare(&rt, first, StaticParameterSpec::new("old").default_value(1))
        .unwrap();
    rt.delete(first).unwrap();
    let fresh =
        StaticParameter::declare(&rt, second, StaticParameterSpec::new("fresh").default_value(2))
            .unwrap();

    assert_ne!(old.id(), fresh.id());
    assert!(matches!(old.set(99), Err(ParameterError::NotFound(_))));
    assert_eq!(old.name(), "");
    assert_eq!(old.try_get(), None);
    assert_eq!(fresh.get(), 2);
    assert_eq!(fresh.name(), "fresh");
}

#[test]
fn test_inner_change_reconfigures_attached_siblings() {
    let rt = Runtime::new();
    let (tool, tool_component) = add_recorded(
        &rt,
        rt.root(),
        "tool",
        ElementKind::StructuringGroup,
        RecordingComponent::new(),
    );
    let (first, first_component) = add_module(&rt, tool, "first");
    let (second, second_component) = add_module(&rt, tool, "second");
    StaticParameter::declare(&rt, tool, StaticParameterSpec::new("width").default_value(1))
        .unwrap();
    let a = StaticParameter::<i32>::declare(
        &rt,
        first,
        StaticParameterSpec::new("a").attach_outer("width", false),
    )
    .unwrap();
    let b = StaticParameter::<i32>::declare(
        &rt,
        second,
        StaticParameterSpec::new("b").attach_outer("width", false),
    )
    .unwrap();
    rt.init(rt.root());
    let counts = || {
        (
            tool_component.reconfigurations(),
            first_component.reconfigurations(),
            second_component.reconfigurations(),
        )
    };
    assert_eq!(counts(), (1, 1, 1));

    a.set(42).unwrap();
    StaticParameterGroup::evaluate(&rt, first);
    assert_eq!(counts(), (2, 2, 2));
    assert_eq!(b.get(), 42);
    assert!(!b.has_changed());
}

#[test]
fn test_group_tree_form_round_trip() {
    let rt = Runtime::new();
    let (module, _) = add_module(&rt, rt.root(), "m");
    let width = StaticParameter::declare(
        &rt,
        module,
        StaticParameterSpec::new("width").default_value(3).config_entry("w"),
    )
    .unwrap();
    let label = StaticParameter::declare(
        &rt,
        module,
        StaticParameterSpec::new("label").default_value("cam".to_string()),
    )
    .unwrap();
    let group = StaticParameterGroup::of(&rt, module).unwrap();

    let mut tree = ConfigTree::new();
    let root = tree.root();
    group.serialize_tree(&mut tree, root, false);
    assert_eq!(tree.children(root).len(), 2);

    width.set(0).unwrap();
    label.set(String::new()).unwrap();
    group.deserialize_tree(&rt, &tree, root, false);
    assert_eq!(width.get(), 3);
    assert_eq!(width.config_entry(), "w");
    assert_eq!(label.get(), "cam");
}

// ----- plugins -----

struct Recorder {
    exposure: Mutex<Option<PendingHandle<i32>>>,
    section: Mutex<Option<String>>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            exposure: Mutex::new(None),
            section: Mutex::new(None),
        }
    }
}

impl ConfigurablePlugin for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn declare_parameters(&self, parameters: &mut PluginParameters) {
        let spec = ParameterSpec::new("exposure")
            .default_value(10)
            .config_entry("exposure")
            .command_line_option("recorder-exposure");
        *self.exposure.lock() = Some(parameters.declare(spec));
    }

    fn initialize(&self, _runtime: &Runtime, config: Option<&ConfigTree>) {
        *self.section.lock() = config.map(|c| c.string_entry("mode"));
    }
}

#[test]
fn test_plugin_values_come_from_plugin_file() {
    let (_dir, path) = temp_config_file(
        "plugins.yaml",
        &[("/recorder/exposure", "33"), ("/recorder/mode", "fast")],
    );
    let rt = Runtime::new();
    let plugin = Recorder::new();
    let mut host = PluginHost::new(PluginConfig::with_file(&path));
    host.register(&rt, &plugin).unwrap();

    let exposure = plugin.exposure.lock().clone().unwrap().live().unwrap();
    assert_eq!(exposure.get(), 33);
    assert_eq!(exposure.config_entry(), "");
    assert_eq!(plugin.section.lock().as_deref(), Some("fast"));
}

#[test]
fn test_plugin_command_line_beats_plugin_file() {
    let (_dir, path) = temp_config_file("plugins.json", &[("/recorder/exposure", "33")]);
    let rt = runtime_with_args(&[("recorder-exposure", "44")]);
    let plugin = Recorder::new();
    let mut host = PluginHost::new(PluginConfig::with_file(&path));
    host.register(&rt, &plugin).unwrap();

    let exposure = plugin.exposure.lock().clone().unwrap().live().unwrap();
    assert_eq!(exposure.get(), 44);
}

#[test]
fn test_plugin_reads_runtime_config_file_section() {
    let rt = Runtime::new();
    let file = ConfigFile::empty().attach(&rt, rt.root());
    file.append_tree(&config_tree(&[
        ("/Runtime/Plugins/recorder/exposure", "12"),
        ("/Runtime/Plugins/recorder/mode", "slow"),
    ]));
    let plugin = Recorder::new();
    let mut host = PluginHost::new(PluginConfig::new());
    host.register(&rt, &plugin).unwrap();

    let exposure = plugin.exposure.lock().clone().unwrap().live().unwrap();
    assert_eq!(exposure.get(), 12);
    assert_eq!(plugin.section.lock().as_deref(), Some("slow"));
}

#[test]
fn test_unreadable_plugin_file_is_ignored() {
    let rt = Runtime::new();
    let plugin = Recorder::new();
    let mut host = PluginHost::new(PluginConfig::with_file("/nonexistent/plugins.json"));
    host.register(&rt, &plugin).unwrap();

    let exposure = plugin.exposure.lock().clone().unwrap().live().unwrap();
    assert_eq!(exposure.get(), 10);
    assert!(plugin.section.lock().is_none());
}

// ----- properties -----

proptest! {
    #[test]
    fn prop_group_binary_form_round_trips(
        width in any::<i32>(),
        label in "[a-z]{0,8}",
        flag in any::<bool>()
    ) {
        let rt = Runtime::new();
        let (module, _) = add_module(&rt, rt.root(), "m");
        let w = StaticParameter::declare(
            &rt,
            module,
            StaticParameterSpec::new("width").default_value(width).config_entry("w"),
        )
        .unwrap();
        let l = StaticParameter::declare(
            &rt,
            module,
            StaticParameterSpec::new("label").default_value(label.clone()),
        )
        .unwrap();
        let f = StaticParameter::declare(
            &rt,
            module,
            StaticParameterSpec::new("flag").default_value(flag),
        )
        .unwrap();
        let group = StaticParameterGroup::of(&rt, module).unwrap();

        let mut out = OutputStream::new();
        group.write_to(&mut out).unwrap();

        w.set(width.wrapping_add(1)).unwrap();
        l.set(format!("{label}x")).unwrap();
        f.set(!flag).unwrap();
        group.read_from(&rt, &mut InputStream::from(out)).unwrap();

        prop_assert_eq!(w.get(), width);
        prop_assert_eq!(l.get(), label);
        prop_assert_eq!(f.get(), flag);
        prop_assert_eq!(w.config_entry(), "w");
    }

    #[test]
    fn prop_attachment_components_share_one_owner(
        edges in prop::collection::vec((0usize..6, prop::option::of(0usize..6)), 0..24)
    ) {
        let graph = StaticParameterGraph::new();
        let ids: Vec<_> = (0..6i32)
            .map(|i| {
                let value = Some(TypedValue::boxed(i));
                graph.insert(&format!("p{i}"), DataType::of::<i32>(), value, false)
            })
            .collect();

        for (from, to) in edges {
            let _ = graph.attach_to(ids[from], to.map(|t| ids[t]));

            for &id in &ids {
                let owner = graph.buffer_owner(id);
                prop_assert!(owner.is_some());
                let owner = owner.unwrap();
                prop_assert_eq!(graph.buffer_owner(owner), Some(owner));
                prop_assert!(graph.all_attached(id).contains(&owner));
                prop_assert_eq!(
                    graph.with_value(id, |v| v.to_text()),
                    graph.with_value(owner, |v| v.to_text())
                );
            }
        }
    }
}
