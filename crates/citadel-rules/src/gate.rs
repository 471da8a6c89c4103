//! The permission gate: ability registry and decision entry point.
//!
//! A [`Gate`] is built once from an ability catalog and handed to whatever needs
//! to authorize. It holds no global state; two gates built from different catalogs
//! are fully independent.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, instrument};

use crate::ability::{Ability, AbilityCatalog, Scope};
use crate::error::DefinitionError;
use crate::policy::{Actor, Policy, PolicyTarget, SUPERUSER, SquadAbility};
use crate::registry::FilterCompiler;

/// A handler supplied by the host application and referenced by name from the
/// catalog's `gate` field.
pub type CustomPolicy = Arc<dyn Fn(&Actor, &PolicyTarget) -> bool + Send + Sync>;

#[derive(Clone)]
enum Handler {
    Builtin(Policy),
    Custom { name: String, policy: CustomPolicy },
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Builtin(policy) => f.debug_tuple("Builtin").field(policy).finish(),
            Handler::Custom { name, .. } => f.debug_tuple("Custom").field(name).finish(),
        }
    }
}

fn scope_policy(scope: Scope) -> Policy {
    match scope {
        Scope::Global => Policy::Global,
        Scope::Character => Policy::Character,
        Scope::Corporation => Policy::Corporation,
        Scope::Alliance => Policy::Alliance,
    }
}

/// Builder for [`Gate`].
#[derive(Default)]
pub struct GateBuilder {
    catalog: AbilityCatalog,
    custom: HashMap<String, CustomPolicy>,
    compiler: FilterCompiler,
}

impl GateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(mut self, catalog: AbilityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Register a custom handler that catalog entries can name as their `gate`.
    pub fn custom_policy<F>(mut self, name: impl Into<String>, policy: F) -> Self
    where
        F: Fn(&Actor, &PolicyTarget) -> bool + Send + Sync + 'static,
    {
        self.custom.insert(name.into(), Arc::new(policy));
        self
    }

    /// Compiler used for grant filters.
    pub fn compiler(mut self, compiler: FilterCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn build(self) -> Result<Gate, DefinitionError> {
        let mut handlers = HashMap::new();

        for ability in SquadAbility::ALL {
            handlers.insert(ability.title().to_string(), Handler::Builtin(Policy::Squad(ability)));
        }
        handlers.insert(SUPERUSER.to_string(), Handler::Builtin(Policy::Superuser));

        for (title, definition) in self.catalog.iter() {
            let ability = Ability::parse(&title)?;
            match &definition.gate {
                Some(gate) => {
                    let policy = self.custom.get(gate).cloned().ok_or_else(|| {
                        DefinitionError::UnknownGate {
                            ability: title.clone(),
                            gate: gate.clone(),
                        }
                    })?;
                    handlers.insert(
                        title,
                        Handler::Custom {
                            name: gate.clone(),
                            policy,
                        },
                    );
                }
                // Catalog entries without a gate never displace a built-in
                None => {
                    handlers
                        .entry(title)
                        .or_insert(Handler::Builtin(scope_policy(ability.scope())));
                }
            }
        }

        Ok(Gate {
            handlers,
            compiler: self.compiler,
        })
    }
}

/// Ability registry and decision entry point.
#[derive(Debug, Clone)]
pub struct Gate {
    handlers: HashMap<String, Handler>,
    compiler: FilterCompiler,
}

impl Gate {
    pub fn builder() -> GateBuilder {
        GateBuilder::new()
    }

    /// Build a gate from a catalog with no custom handlers.
    pub fn from_catalog(catalog: AbilityCatalog) -> Result<Self, DefinitionError> {
        GateBuilder::new().catalog(catalog).build()
    }

    /// Decide whether the actor may exercise the ability on the target.
    ///
    /// Unknown or malformed abilities and broken grant filters are errors, never a
    /// silent denial.
    #[instrument(level = "debug", skip(self, actor, target), fields(user_id = actor.user_id()))]
    pub fn decide(
        &self,
        actor: &Actor,
        ability: &str,
        target: &PolicyTarget,
    ) -> Result<bool, DefinitionError> {
        let parsed = Ability::parse(ability)?;
        let handler = self
            .handlers
            .get(parsed.as_str())
            .ok_or_else(|| DefinitionError::UnknownAbility(ability.to_string()))?;

        if actor.is_superuser() {
            debug!("Superuser bypass");
            return Ok(true);
        }

        let allowed = match handler {
            Handler::Builtin(policy) => policy.evaluate(actor, ability, target, &self.compiler)?,
            Handler::Custom { name, policy } => {
                debug!(gate = %name, "Dispatching to custom policy");
                policy(actor, target)
            }
        };

        debug!(allowed, "Policy decision");
        Ok(allowed)
    }

    /// [`decide`](Self::decide), with definition errors logged and treated as a
    /// denial. For call sites that cannot surface errors.
    pub fn allows(&self, actor: &Actor, ability: &str, target: &PolicyTarget) -> bool {
        match self.decide(actor, ability, target) {
            Ok(allowed) => allowed,
            Err(e) => {
                error!(ability, error = %e, "Permission definition error");
                false
            }
        }
    }

    pub fn contains(&self, ability: &str) -> bool {
        self.handlers.contains_key(ability)
    }

    /// All registered abilities, sorted.
    pub fn abilities(&self) -> Vec<&str> {
        let mut abilities: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        abilities.sort_unstable();
        abilities
    }
}
