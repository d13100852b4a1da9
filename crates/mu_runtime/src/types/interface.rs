use mu_core::SymbolId;

/// A named set of member-function signatures. Classes conform structurally:
/// a class implements an interface when it provides every member.
#[derive(Clone, Debug, Default)]
pub struct InterfaceInfo {
    pub methods: Vec<SymbolId>,
}
