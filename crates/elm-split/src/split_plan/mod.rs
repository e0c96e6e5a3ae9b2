//! Split plan: which declarations stay private and which become shared
//!
//! The planner walks the programs in order and compares each one with every
//! later program. Names two programs both need are promoted into the shared
//! set in one batch per pair. [`SplitPlan::settle`] then closes the shared
//! set so the shared module is self-contained.

use log::{debug, trace};

use crate::{
    dependency_map::DependencyMap, error::Result, reachability::DependencyGraph,
    types::FxIndexSet,
};


/// Planner input: one program and its dependency closure
#[derive(Debug, Clone)]
pub struct ProgramDeps {
    pub name: String,
    pub closure: FxIndexSet<String>,
}

/// Per-program result of planning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitProgram {
    pub name: String,
    /// Names only this program uses
    pub needs: FxIndexSet<String>,
    /// Names this program imports from the shared module
    pub shared: FxIndexSet<String>,
}

/// The complete partition
#[derive(Debug, Clone, Default)]
pub struct SplitPlan {
    /// Programs in entry table order
    pub programs: Vec<SplitProgram>,
    /// Every name the shared module holds
    pub shared: FxIndexSet<String>,
}

/// Partition program closures into private and shared names
pub fn plan<P, I, S>(programs: P, forced_shared: I) -> SplitPlan
where
    P: IntoIterator<Item = ProgramDeps>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut shared: FxIndexSet<String> = forced_shared.into_iter().map(Into::into).collect();
    let mut programs: Vec<SplitProgram> = programs
        .into_iter()
        .map(|program| SplitProgram {
            name: program.name,
            needs: program.closure,
            shared: FxIndexSet::default(),
        })
        .collect();

    for index in 0..programs.len() {
        let (head, tail) = programs.split_at_mut(index + 1);
        let current = &mut head[index];

        let already_shared: Vec<String> = current
            .needs
            .iter()
            .filter(|name| shared.contains(*name))
            .cloned()
            .collect();
        current.shared.extend(already_shared);

        for later in tail.iter_mut() {
            let common: Vec<String> = current
                .needs
                .iter()
                .filter(|name| later.needs.contains(*name))
                .cloned()
                .collect();
            if !common.is_empty() {
                trace!(
                    "`{}` and `{}` share {} names",
                    current.name,
                    later.name,
                    common.len()
                );
            }
            for name in common {
                current.needs.shift_remove(&name);
                later.needs.shift_remove(&name);
                current.shared.insert(name.clone());
                later.shared.insert(name.clone());
                shared.insert(name);
            }

            let imported: Vec<String> = current
                .needs
                .iter()
                .filter(|name| later.shared.contains(*name))
                .cloned()
                .collect();
            current.shared.extend(imported);
        }

        current.needs.retain(|name| !current.shared.contains(name));
    }

    debug!(
        "Planned {} programs with {} shared names",
        programs.len(),
        shared.len()
    );
    SplitPlan { programs, shared }
}

impl SplitPlan {
    /// Close the shared set over its dependencies and over private writers.
    ///
    /// A private declaration that assigns a shared name is promoted, since a
    /// namespace import is read-only. Names with no declaration are dropped
    /// from every shared set afterwards.
    pub fn settle(&mut self, graph: &DependencyGraph<'_>, map: &DependencyMap) -> Result<()> {
        loop {
            let before = self.shared.len();

            let closed = graph.closure_from(self.shared.iter(), "shared module")?;
            self.shared.extend(closed);

            let writers: Vec<String> = self
                .programs
                .iter()
                .flat_map(|program| program.needs.iter())
                .filter(|name| !self.shared.contains(*name))
                .filter(|name| {
                    map.get(name).is_some_and(|declaration| {
                        declaration
                            .writes
                            .iter()
                            .any(|written| self.shared.contains(written))
                    })
                })
                .cloned()
                .collect();
            for writer in writers {
                trace!("Promoting `{writer}`, it assigns a shared name");
                self.shared.insert(writer);
            }

            if self.shared.len() == before {
                break;
            }
        }

        self.shared.retain(|name| {
            let declared = map.contains(name);
            if !declared {
                debug!("Dropping `{name}` from the shared set, it is never declared");
            }
            declared
        });

        for program in &mut self.programs {
            let moved: Vec<String> = program
                .needs
                .iter()
                .filter(|name| self.shared.contains(*name))
                .cloned()
                .collect();
            program.shared.extend(moved);
            program.needs.retain(|name| !self.shared.contains(name));
            program.shared.retain(|name| self.shared.contains(name));
        }
        Ok(())
    }

    pub fn program(&self, name: &str) -> Option<&SplitProgram> {
        self.programs.iter().find(|program| program.name == name)
    }
}
