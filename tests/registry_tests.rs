use bitscope::{
    Config, DecodeContext, DecodeResult, DependencyRef, FormatDescriptor, Registry, RegistryError,
    default_registry,
};

fn byte(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    d.field_u("byte", 8)?;
    Ok(())
}

fn wrapper(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    d.field_format("inner", "inner")?;
    Ok(())
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut reg = Registry::new();
    reg.register(FormatDescriptor::new("byte", byte)).unwrap();
    let err = reg.register(FormatDescriptor::new("byte", byte)).unwrap_err();
    assert_eq!(err, RegistryError::DuplicateFormat("byte".into()));
    assert_eq!(reg.len(), 1);
}

#[test]
fn resolve_names_every_missing_dependency() {
    let mut reg = Registry::new();
    reg.register(
        FormatDescriptor::new("outer", wrapper)
            .dependency(DependencyRef::format("nope"))
            .dependency(DependencyRef::group("inner", ["byte", "also_nope", "nope"])),
    )
    .unwrap();
    reg.register(FormatDescriptor::new("byte", byte)).unwrap();

    match reg.resolve() {
        Err(RegistryError::UnresolvedDependency { missing }) => {
            assert_eq!(missing, vec!["nope".to_string(), "also_nope".to_string()]);
        }
        other => panic!("expected UnresolvedDependency, got {other:?}"),
    }
    assert!(!reg.is_resolved());
}

#[test]
fn resolve_succeeds_once_everything_exists() {
    let mut reg = Registry::new();
    reg.register(
        FormatDescriptor::new("outer", wrapper).dependency(DependencyRef::group("inner", ["byte"])),
    )
    .unwrap();
    reg.register(FormatDescriptor::new("byte", byte)).unwrap();
    reg.resolve().unwrap();
    assert!(reg.is_resolved());

    let decoded = reg.decode("outer", &[0x2a], &Config::new()).unwrap();
    let inner = decoded.tree.select("inner.byte").unwrap();
    assert_eq!(inner.value().as_u64(), Some(0x2a));
    assert!(decoded.diagnostics.is_empty());
}

#[test]
fn registry_group_resolves_by_membership() {
    let mut reg = Registry::new();
    reg.register(FormatDescriptor::new("outer", wrapper).dependency(DependencyRef::group("inner", ["bytes"])))
        .unwrap();
    reg.register(FormatDescriptor::new("byte", byte).group("bytes"))
        .unwrap();
    reg.resolve().unwrap();

    let decoded = reg.decode("outer", &[7], &Config::new()).unwrap();
    assert_eq!(decoded.tree.select("inner").unwrap().format(), Some("byte"));
}

#[test]
fn decode_needs_resolved_registry_and_known_format() {
    let mut reg = Registry::new();
    reg.register(FormatDescriptor::new("byte", byte)).unwrap();
    assert_eq!(
        reg.decode("byte", &[1], &Config::new()).unwrap_err(),
        RegistryError::NotResolved
    );

    reg.resolve().unwrap();
    assert_eq!(
        reg.decode("word", &[1], &Config::new()).unwrap_err(),
        RegistryError::UnknownFormat("word".into())
    );
}

#[test]
fn registering_after_resolve_requires_resolving_again() {
    let mut reg = Registry::new();
    reg.register(FormatDescriptor::new("byte", byte)).unwrap();
    reg.resolve().unwrap();
    reg.register(FormatDescriptor::new("other", byte)).unwrap();
    assert!(!reg.is_resolved());
}

#[test]
fn builtin_registry_lists_formats() {
    let reg = default_registry().unwrap();
    let names: Vec<&str> = reg.format_names().collect();
    assert_eq!(names, vec!["hevc_au", "hevc_nalu", "avc_au", "avc_nalu"]);

    let au = reg.descriptor("hevc_au").unwrap();
    assert_eq!(au.root_name, "access_unit");
    assert_eq!(au.default_config.record_length_size(), 4);
    assert_eq!(reg.descriptor("hevc_nalu").unwrap().groups, vec!["nal_unit".to_string()]);
}
