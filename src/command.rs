//! Text commands that drive a [`BPTreeMultimap`].
//!
//! One command per line, tokens separated by whitespace:
//!
//! ```text
//! insert <key> <value>
//! delete <key> <value>
//! find <key>
//! ```
//!
//! `find` yields the key's values in ascending order separated by single
//! spaces, or `null` when the key holds nothing.
//!
//! ```
//! use mv_bptree::{BPTreeMultimap, command};
//!
//! let mut tree: BPTreeMultimap<i64, i64> = BPTreeMultimap::new();
//! let script = "insert 1 20\ninsert 1 10\nfind 1\ndelete 1 10\ndelete 1 20\nfind 1";
//! let output = command::apply_all(&mut tree, script.lines()).unwrap();
//!
//! let rendered: Vec<String> = output.iter().map(ToString::to_string).collect();
//! assert_eq!(rendered, ["10 20", "null"]);
//! ```

use core::fmt;
use core::str::FromStr;

use log::debug;

use crate::error::{Error, Result};
use crate::multimap::BPTreeMultimap;

/// One parsed operation-feed line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<K, V> {
    Insert(K, V),
    Delete(K, V),
    Find(K),
}

/// What applying a [`Command`] produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutput<V> {
    /// Whether the pair was new.
    Inserted(bool),
    /// Whether the pair was present.
    Deleted(bool),
    Found(FindResult<V>),
}

/// Values found under a key, ascending. Displays as `null` when empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindResult<V>(pub Vec<V>);

impl<V> FindResult<V> {
    #[must_use]
    pub fn values(&self) -> &[V] {
        &self.0
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V: fmt::Display> fmt::Display for FindResult<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((first, rest)) = self.0.split_first() else {
            return f.write_str("null");
        };
        write!(f, "{first}")?;
        for value in rest {
            write!(f, " {value}")?;
        }
        Ok(())
    }
}

impl<K, V> Command<K, V> {
    /// The command word as written in a feed.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Command::Insert(..) => "insert",
            Command::Delete(..) => "delete",
            Command::Find(_) => "find",
        }
    }
}

impl<K: Ord + Clone, V: Ord + Clone> Command<K, V> {
    /// Runs the command against `tree`.
    pub fn apply(self, tree: &mut BPTreeMultimap<K, V>) -> CommandOutput<V> {
        match self {
            Command::Insert(key, value) => CommandOutput::Inserted(tree.insert(key, value)),
            Command::Delete(key, value) => CommandOutput::Deleted(tree.delete(&key, &value)),
            Command::Find(key) => CommandOutput::Found(FindResult(tree.find(&key).to_vec())),
        }
    }
}

impl<K: FromStr, V: FromStr> FromStr for Command<K, V> {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let word = tokens.next().ok_or(Error::EmptyCommand)?;
        let args: Vec<&str> = tokens.collect();

        match word {
            "insert" => {
                let [key, value] = expect_args::<2>("insert", &args)?;
                Ok(Command::Insert(parse_arg("insert", key)?, parse_arg("insert", value)?))
            }
            "delete" => {
                let [key, value] = expect_args::<2>("delete", &args)?;
                Ok(Command::Delete(parse_arg("delete", key)?, parse_arg("delete", value)?))
            }
            "find" => {
                let [key] = expect_args::<1>("find", &args)?;
                Ok(Command::Find(parse_arg("find", key)?))
            }
            other => Err(Error::UnknownCommand(other.to_owned())),
        }
    }
}

fn expect_args<'a, const N: usize>(command: &'static str, args: &[&'a str]) -> Result<[&'a str; N]> {
    <[&str; N]>::try_from(args).map_err(|_| Error::WrongArity {
        command,
        expected: N,
        found: args.len(),
    })
}

fn parse_arg<T: FromStr>(command: &'static str, argument: &str) -> Result<T> {
    argument.parse().map_err(|_| Error::InvalidArgument {
        command,
        argument: argument.to_owned(),
    })
}

/// Parses and applies every non-blank line in order, collecting `find` results.
///
/// Stops at the first malformed line; commands before it have already been
/// applied.
///
/// # Errors
///
/// Returns the parse error of the first malformed line.
pub fn apply_all<'a, K, V, I>(tree: &mut BPTreeMultimap<K, V>, lines: I) -> Result<Vec<FindResult<V>>>
where
    K: FromStr + Ord + Clone,
    V: FromStr + Ord + Clone,
    I: IntoIterator<Item = &'a str>,
{
    let mut results = Vec::new();
    for (lineno, line) in lines.into_iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let command: Command<K, V> = line.parse().inspect_err(|err| debug!("line {}: {err}", lineno + 1))?;
        if let CommandOutput::Found(found) = command.apply(tree) {
            results.push(found);
        }
    }
    Ok(results)
}
