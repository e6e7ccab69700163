use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::arg::{ArgType, ArgValue, Shape};
use crate::codec::{Command, CommandHeader};
use crate::error::{CommandError, Result};
use crate::validator::validate_args;

/// Largest shape table file accepted by [`ShapeTable::from_file`].
pub const MAX_SHAPE_TABLE_SIZE: usize = 1024 * 1024;

/// Error returned by a command handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of invoking a command handler.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Callback invoked with each decoded command.
pub type Handler = Arc<dyn Fn(&Command) -> HandlerResult + Send + Sync>;

/// Argument shape and handler for one command id.
#[derive(Clone)]
pub struct CommandEntry {
    shape: Shape,
    handler: Handler,
}

impl CommandEntry {
    pub fn new(
        shape: impl Into<Shape>,
        handler: impl Fn(&Command) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        Self::with_handler(shape, Arc::new(handler))
    }

    pub fn with_handler(shape: impl Into<Shape>, handler: Handler) -> Self {
        Self {
            shape: shape.into(),
            handler,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub(crate) fn invoke(&self, command: &Command) -> HandlerResult {
        (self.handler)(command)
    }
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// Collects class registrations before freezing them into a [`CommandRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    classes: HashSet<(u8, u8)>,
    entries: HashMap<CommandHeader, CommandEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every command of one feature class.
    ///
    /// A feature/class pair can only be registered once.
    pub fn register_class(
        &mut self,
        feature: u8,
        class: u8,
        commands: impl IntoIterator<Item = (u16, CommandEntry)>,
    ) -> Result<&mut Self> {
        if !self.classes.insert((feature, class)) {
            return Err(CommandError::DuplicateClass { feature, class });
        }
        for (command, entry) in commands {
            self.entries
                .insert(CommandHeader::new(feature, class, command), entry);
        }
        Ok(self)
    }

    /// Register a shape table, routing all of its commands to `handler`.
    pub fn register_table(&mut self, table: &ShapeTable, handler: Handler) -> Result<&mut Self> {
        self.register_class(table.feature, table.class, table.bind(handler))
    }

    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            classes: self.classes,
            entries: self.entries,
        }
    }
}

/// Read-only `(feature, class, command) -> (shape, handler)` map.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    classes: HashSet<(u8, u8)>,
    entries: HashMap<CommandHeader, CommandEntry>,
}

impl CommandRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a command.
    pub fn get(&self, header: &CommandHeader) -> Option<&CommandEntry> {
        self.entries.get(header)
    }

    /// Argument shape of a command, if registered.
    pub fn shape(&self, header: &CommandHeader) -> Option<&Shape> {
        self.get(header).map(CommandEntry::shape)
    }

    /// Whether any commands were registered for `feature`/`class`.
    pub fn has_class(&self, feature: u8, class: u8) -> bool {
        self.classes.contains(&(feature, class))
    }

    /// Check `args` against the registered shape of `header`.
    ///
    /// Commands without a registered shape pass unchecked.
    pub fn validate(&self, header: CommandHeader, args: &[ArgValue]) -> Result<()> {
        match self.shape(&header) {
            Some(shape) => validate_args(header, shape, args),
            None => Ok(()),
        }
    }

    /// Registered commands, sorted.
    pub fn headers(&self) -> Vec<CommandHeader> {
        let mut headers: Vec<CommandHeader> = self.entries.keys().copied().collect();
        headers.sort_unstable();
        headers
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Argument shapes of one feature class, loaded from data.
///
/// ```json
/// {"feature": 1, "class": 4, "commands": {"0": ["u8", "string"], "1": []}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeTable {
    pub feature: u8,
    pub class: u8,
    pub commands: BTreeMap<u16, Shape>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawShapeTable {
    feature: u8,
    class: u8,
    commands: BTreeMap<String, Vec<ArgType>>,
}

impl ShapeTable {
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawShapeTable = serde_json::from_str(json)?;
        let mut commands = BTreeMap::new();
        for (key, types) in raw.commands {
            let command = key.trim().parse::<u16>().map_err(|_| {
                CommandError::InvalidShapeTable(format!("command id '{key}' is not a u16"))
            })?;
            if commands.insert(command, Shape::new(types)).is_some() {
                return Err(CommandError::InvalidShapeTable(format!(
                    "command id {command} appears twice"
                )));
            }
        }
        Ok(Self {
            feature: raw.feature,
            class: raw.class,
            commands,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|err| {
            CommandError::InvalidShapeTable(format!("{}: {err}", path.display()))
        })?;
        let limit = u64::try_from(MAX_SHAPE_TABLE_SIZE.saturating_add(1)).unwrap_or(u64::MAX);
        let mut content = String::new();
        file.take(limit)
            .read_to_string(&mut content)
            .map_err(|err| CommandError::InvalidShapeTable(format!("{}: {err}", path.display())))?;
        if content.len() > MAX_SHAPE_TABLE_SIZE {
            return Err(CommandError::InvalidShapeTable(format!(
                "{} exceeds {MAX_SHAPE_TABLE_SIZE} bytes",
                path.display()
            )));
        }
        Self::from_json(&content)
    }

    pub fn shape(&self, command: u16) -> Option<&Shape> {
        self.commands.get(&command)
    }

    /// Pair every shape with `handler`.
    pub fn bind(&self, handler: Handler) -> Vec<(u16, CommandEntry)> {
        self.commands
            .iter()
            .map(|(&command, shape)| {
                (
                    command,
                    CommandEntry::with_handler(shape.clone(), Arc::clone(&handler)),
                )
            })
            .collect()
    }
}
