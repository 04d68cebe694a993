//! Resolution pipeline: reads data files, resolves cross-references, builds
//! the catalog and tech tree.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, deserialization
//! helpers, and [`load_game_data`], which turns a content directory into
//! ready-to-run engine types.

use crate::schema::{
    ActionData, AmountData, FuelData, InitialStateData, MachineData, RecipeData, ResourceData,
    RoleData, TechData, UnlockData,
};
use genesis_core::catalog::{
    Catalog, CatalogBuilder, CatalogError, FuelSpec, MachineRole, MachineSpec, ManualActionSpec,
    Recipe,
};
use genesis_core::config::EngineConfig;
use genesis_core::fixed::{Fixed64, f64_to_fixed64};
use genesis_core::id::{ActionKey, MachineKey, RecipeKey, ResourceKey};
use genesis_core::ledger::{ResourceBag, ResourceLedger};
use genesis_core::roster::MachineRoster;
use genesis_tech_tree::{TechSpec, TechTree, TechTreeError, Unlock, UnlockedTechs};
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A number that cannot be represented (NaN, infinite).
    #[error("invalid value in {file}: {detail}")]
    InvalidValue { file: PathBuf, detail: String },

    /// Technology prerequisites form a cycle.
    #[error("cyclic prerequisites in {file} among: {}", .names.join(", "))]
    CyclicPrerequisites { file: PathBuf, names: Vec<String> },

    /// The resolved content failed catalog validation.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The resolved technologies failed tech tree validation.
    #[error(transparent)]
    TechTree(#[from] TechTreeError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. For TOML files, extracts the array at the
/// given `toml_key` from a top-level table. For RON and JSON, deserializes
/// directly as `Vec<T>`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => {
            let table: toml::Value = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
            let array = table
                .get(toml_key)
                .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?
                .clone();
            array
                .try_into()
                .map_err(|e: toml::de::Error| parse_error(path, e))
        }
    }
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Check whether a name already exists in a map, returning a `DuplicateName`
/// error if so.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Index a list of definitions by name, rejecting duplicates.
fn index_names<'a, T>(
    items: &'a [T],
    name: impl Fn(&T) -> &str,
    file: &Path,
) -> Result<HashMap<String, &'a T>, DataLoadError> {
    let mut map = HashMap::with_capacity(items.len());
    for item in items {
        check_duplicate(&map, name(item), file)?;
        map.insert(name(item).to_string(), item);
    }
    Ok(map)
}

// ===========================================================================
// Loaded content
// ===========================================================================

/// The player's state at the start of a new game, resolved against content.
#[derive(Debug, Clone, Default)]
pub struct InitialState {
    pub ledger: ResourceLedger,
    pub roster: MachineRoster,
    pub unlocked_actions: BTreeSet<ActionKey>,
    pub unlocked_techs: UnlockedTechs,
}

/// Everything loaded from one content directory.
#[derive(Debug)]
pub struct GameData {
    pub catalog: Catalog,
    pub tech_tree: TechTree,
    pub config: EngineConfig,
    pub initial_state: InitialState,
}

/// Declared resource names, if a `resources` file exists. Without one every
/// resource name is accepted.
struct ResourceNames(Option<HashMap<String, ()>>);

impl ResourceNames {
    fn check(&self, name: &str, file: &Path) -> Result<ResourceKey, DataLoadError> {
        if let Some(declared) = &self.0 {
            resolve_name(declared, name, file, "resource")?;
        }
        Ok(ResourceKey::from(name))
    }
}

fn to_fixed(value: f64, what: &str, file: &Path) -> Result<Fixed64, DataLoadError> {
    if !value.is_finite() {
        return Err(DataLoadError::InvalidValue {
            file: file.to_path_buf(),
            detail: format!("{what} is {value}"),
        });
    }
    Ok(f64_to_fixed64(value))
}

fn to_bag(
    amounts: &[AmountData],
    resources: &ResourceNames,
    file: &Path,
) -> Result<ResourceBag, DataLoadError> {
    let mut bag = ResourceBag::new();
    for entry in amounts {
        let key = resources.check(entry.resource(), file)?;
        let amount = to_fixed(entry.amount(), entry.resource(), file)?;
        bag.add(key, amount);
    }
    Ok(bag)
}

// ===========================================================================
// Loading pipeline
// ===========================================================================

/// Load every content file in `dir` and resolve it into engine types.
///
/// `machines` and `actions` are required; `resources`, `recipes`, `techs`,
/// `config` and `initial_state` are optional.
pub fn load_game_data(dir: &Path) -> Result<GameData, DataLoadError> {
    // Resources.
    let resources = match find_data_file(dir, "resources")? {
        Some(path) => {
            let list: Vec<ResourceData> = deserialize_list(&path, "resources")?;
            let names = index_names(&list, |r| r.name.as_str(), &path)?;
            ResourceNames(Some(names.into_keys().map(|n| (n, ())).collect()))
        }
        None => ResourceNames(None),
    };

    let mut builder = CatalogBuilder::new();

    // Recipes.
    let mut recipe_names: HashMap<String, ()> = HashMap::new();
    if let Some(path) = find_data_file(dir, "recipes")? {
        let list: Vec<RecipeData> = deserialize_list(&path, "recipes")?;
        for data in &list {
            check_duplicate(&recipe_names, &data.name, &path)?;
            let recipe = Recipe {
                inputs: to_bag(&data.inputs, &resources, &path)?,
                outputs: to_bag(&data.outputs, &resources, &path)?,
                duration: data.duration,
            };
            builder.register_recipe(data.name.as_str(), recipe)?;
            recipe_names.insert(data.name.clone(), ());
        }
    }

    // Machines.
    let machines_path = require_data_file(dir, "machines")?;
    let machines: Vec<MachineData> = deserialize_list(&machines_path, "machines")?;
    let machine_index = index_names(&machines, |m| m.name.as_str(), &machines_path)?;
    for data in &machines {
        let spec = resolve_machine(data, &resources, &recipe_names, &machines_path)?;
        builder.register_machine(data.name.as_str(), spec)?;
    }

    // Actions.
    let actions_path = require_data_file(dir, "actions")?;
    let actions: Vec<ActionData> = deserialize_list(&actions_path, "actions")?;
    let action_index = index_names(&actions, |a| a.name.as_str(), &actions_path)?;
    for data in &actions {
        let mut spec = ManualActionSpec::new(
            data.display_name.clone().unwrap_or_else(|| data.name.clone()),
            data.duration,
        )
        .with_cost(to_bag(&data.cost, &resources, &actions_path)?)
        .with_rewards(to_bag(&data.rewards, &resources, &actions_path)?);
        for (skill, amount) in &data.xp {
            spec = spec.with_xp(skill.as_str(), *amount);
        }
        for (skill, level) in &data.unlock_req {
            spec = spec.with_unlock_req(skill.as_str(), *level);
        }
        builder.register_action(data.name.as_str(), spec)?;
    }

    let catalog = builder.build()?;

    // Technologies.
    let mut tech_tree = TechTree::new();
    let mut tech_names: HashMap<String, ()> = HashMap::new();
    let mut granted_actions: BTreeSet<ActionKey> = BTreeSet::new();
    if let Some(path) = find_data_file(dir, "techs")? {
        let list: Vec<TechData> = deserialize_list(&path, "techs")?;
        let tech_index = index_names(&list, |t| t.name.as_str(), &path)?;
        for tech in order_techs(&list, &tech_index, &path)? {
            let mut spec = TechSpec::new(
                tech.display_name.clone().unwrap_or_else(|| tech.name.clone()),
                tech.tier,
            )
            .with_cost(to_bag(&tech.cost, &resources, &path)?);
            for prereq in &tech.prerequisites {
                spec = spec.with_prerequisite(prereq.as_str());
            }
            for unlock in &tech.unlocks {
                let unlock = match unlock {
                    UnlockData::Machine(name) => {
                        resolve_name(&machine_index, name, &path, "machine")?;
                        Unlock::Machine(MachineKey::from(name.as_str()))
                    }
                    UnlockData::Action(name) => {
                        resolve_name(&action_index, name, &path, "action")?;
                        granted_actions.insert(ActionKey::from(name.as_str()));
                        Unlock::Action(ActionKey::from(name.as_str()))
                    }
                    UnlockData::Custom(name) => Unlock::Custom(name.clone()),
                };
                spec = spec.with_unlock(unlock);
            }
            tech_tree.register(tech.name.as_str(), spec)?;
            tech_names.insert(tech.name.clone(), ());
        }
    }

    // Config.
    let config = match find_data_file(dir, "config")? {
        Some(path) => deserialize_file(&path)?,
        None => EngineConfig::default(),
    };

    // Starting state.
    let (initial_path, initial_data) = match find_data_file(dir, "initial_state")? {
        Some(path) => {
            let data: InitialStateData = deserialize_file(&path)?;
            (path, data)
        }
        None => (dir.join("initial_state"), InitialStateData::default()),
    };

    let mut initial_state = InitialState::default();
    for entry in &initial_data.resources {
        let key = resources.check(entry.resource(), &initial_path)?;
        let amount = to_fixed(entry.amount(), entry.resource(), &initial_path)?;
        initial_state
            .ledger
            .set(key, amount)
            .map_err(|e| DataLoadError::InvalidValue {
                file: initial_path.clone(),
                detail: e.to_string(),
            })?;
    }
    for (name, count) in &initial_data.machines {
        resolve_name(&machine_index, name, &initial_path, "machine")?;
        initial_state.roster.add(name.as_str(), *count);
    }
    for name in &initial_data.unlocked_techs {
        resolve_name(&tech_names, name, &initial_path, "tech")?;
        initial_state.unlocked_techs.insert(name.as_str());
    }
    match &initial_data.unlocked_actions {
        Some(names) => {
            for name in names {
                resolve_name(&action_index, name, &initial_path, "action")?;
                initial_state
                    .unlocked_actions
                    .insert(ActionKey::from(name.as_str()));
            }
        }
        None => {
            initial_state.unlocked_actions = catalog
                .actions()
                .map(|(key, _)| key.clone())
                .filter(|key| !granted_actions.contains(key))
                .collect();
        }
    }
    initial_state
        .unlocked_actions
        .extend(tech_tree.unlocked_actions(&initial_state.unlocked_techs));

    info!(
        dir = %dir.display(),
        machines = catalog.machine_count(),
        actions = catalog.action_count(),
        recipes = catalog.recipe_count(),
        techs = tech_tree.technology_count(),
        "content loaded"
    );

    Ok(GameData {
        catalog,
        tech_tree,
        config,
        initial_state,
    })
}

fn resolve_machine(
    data: &MachineData,
    resources: &ResourceNames,
    recipes: &HashMap<String, ()>,
    file: &Path,
) -> Result<MachineSpec, DataLoadError> {
    let role = match &data.role {
        RoleData::Generator { power_gen, fuel } => MachineRole::Generator {
            power_gen: to_fixed(*power_gen, "power_gen", file)?,
            fuel: match fuel {
                None => None,
                Some(FuelData::Short(resource)) => {
                    Some(FuelSpec::consumed(resources.check(resource, file)?))
                }
                Some(FuelData::Full { resource, consumed }) => Some(FuelSpec {
                    resource: resources.check(resource, file)?,
                    consumed: *consumed,
                }),
            },
        },
        RoleData::Extractor { power, produces } => MachineRole::Extractor {
            power: to_fixed(*power, "power", file)?,
            produces: produces
                .iter()
                .map(|r| resources.check(r, file))
                .collect::<Result<_, _>>()?,
        },
        RoleData::Fabricator {
            power,
            recipes: names,
        } => MachineRole::Fabricator {
            power: to_fixed(*power, "power", file)?,
            recipes: names
                .iter()
                .map(|n| resolve_name(recipes, n, file, "recipe").map(|_| RecipeKey::from(n.as_str())))
                .collect::<Result<_, _>>()?,
        },
        RoleData::Researcher {
            power,
            resource,
            rate,
        } => MachineRole::Researcher {
            power: to_fixed(*power, "power", file)?,
            resource: resources.check(resource, file)?,
            rate: to_fixed(*rate, "rate", file)?,
        },
    };

    Ok(MachineSpec {
        name: data.display_name.clone().unwrap_or_else(|| data.name.clone()),
        tier: data.tier,
        role,
        build_cost: to_bag(&data.build_cost, resources, file)?,
    })
}

/// Order technologies so every prerequisite precedes its dependents,
/// keeping declaration order among independent entries.
fn order_techs<'a>(
    techs: &'a [TechData],
    index: &HashMap<String, &'a TechData>,
    file: &Path,
) -> Result<Vec<&'a TechData>, DataLoadError> {
    let mut pending: HashMap<&str, usize> = HashMap::with_capacity(techs.len());
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for tech in techs {
        for prereq in &tech.prerequisites {
            resolve_name(index, prereq, file, "tech")?;
            dependents
                .entry(prereq.as_str())
                .or_default()
                .push(tech.name.as_str());
        }
        pending.insert(tech.name.as_str(), tech.prerequisites.len());
    }

    let mut ready: VecDeque<&str> = techs
        .iter()
        .filter(|t| t.prerequisites.is_empty())
        .map(|t| t.name.as_str())
        .collect();
    let mut ordered = Vec::with_capacity(techs.len());
    while let Some(name) = ready.pop_front() {
        if let Some(tech) = index.get(name) {
            ordered.push(*tech);
        }
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(remaining) = pending.get_mut(dependent) {
                *remaining -= 1;
                if *remaining == 0 {
                    ready.push_back(*dependent);
                }
            }
        }
    }

    if ordered.len() < techs.len() {
        let mut names: Vec<String> = pending
            .into_iter()
            .filter(|(_, remaining)| *remaining > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        names.sort();
        return Err(DataLoadError::CyclicPrerequisites {
            file: file.to_path_buf(),
            names,
        });
    }
    debug!(count = ordered.len(), "technologies ordered");
    Ok(ordered)
}

// ===========================================================================
// Tests
// ===========================================================================
