//! The splitting pipeline
//!
//! bundle text → layout → dependency map → programs → closures → plan →
//! module texts. Nothing here touches the file system; the binary decides
//! where the modules go.

use log::{debug, info};

use crate::{
    chunk_assembler::{ChunkAssembler, SharedImport},
    config::Config,
    dependency_map::DependencyMap,
    entry_points::{BundleLayout, EntryTable},
    error::{Result, SplitError},
    graph_builder::GraphBuilder,
    reachability::DependencyGraph,
    split_plan::{ProgramDeps, plan},
    types::FxIndexSet,
};

/// Requester named when an unnamed top-level statement needs an unknown name
const UNNAMED_ORIGIN: &str = "top-level statement";

/// Which output shape a run produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitOutcome {
    /// N≥2 programs: one module each plus the shared module
    SplitProgramsOneShared,
    /// One program: a single module reduced to live code
    SingleProgramReduced,
}

/// One module to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputModule {
    /// File name relative to the output directory
    pub file_name: String,
    /// Program the module exports; `None` for the shared module
    pub program: Option<String>,
    pub contents: String,
}

#[derive(Debug, Clone)]
pub struct SplitResult {
    pub outcome: SplitOutcome,
    /// Program names in entry table order
    pub programs: Vec<String>,
    /// Shared module first when there is one
    pub modules: Vec<OutputModule>,
}

/// Runs the pipeline with one configuration
#[derive(Debug, Clone, Default)]
pub struct Splitter {
    config: Config,
}

impl Splitter {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Split `source`; output file names are prefixed with `stem`
    pub fn split(&self, source: &str, stem: &str) -> Result<SplitResult> {
        let layout = BundleLayout::locate(source)?;
        let body = layout.body(source);
        let ambient = self.config.ambient();
        let relocate = |err: SplitError| err.relocate(source, layout.body_start);
        let map = GraphBuilder::new(&ambient).build(body).map_err(relocate)?;
        self.check_alias(&map, body).map_err(relocate)?;

        let table = EntryTable::parse(source, &layout)?;
        let programs = table.programs()?;
        let program_names: Vec<String> = programs.iter().map(|p| p.name.clone()).collect();
        info!("Found {} programs: {}", programs.len(), program_names.join(", "));

        let graph = DependencyGraph::new(&map, &self.config.forced_shared);
        graph.closure_from(map.unnamed_needs(), UNNAMED_ORIGIN)?;
        let assembler = ChunkAssembler::new(&map, body, &self.config.replacements);

        if let [program] = programs.as_slice() {
            let seeds = table.init_needs(program, &ambient)?;
            let live = graph.requires(&seeds, &program.name)?;
            debug!(
                "Single program `{}` keeps {} of {} declarations",
                program.name,
                live.len(),
                map.declarations.len()
            );
            let contents =
                assembler.program_module(&program.name, &live, table.text_of(program.init), None)?;
            return Ok(SplitResult {
                outcome: SplitOutcome::SingleProgramReduced,
                programs: program_names,
                modules: vec![OutputModule {
                    file_name: program_file_name(stem, &program.name),
                    program: Some(program.name.clone()),
                    contents,
                }],
            });
        }

        let deps = programs
            .iter()
            .map(|program| {
                let seeds = table.init_needs(program, &ambient)?;
                Ok(ProgramDeps {
                    name: program.name.clone(),
                    closure: graph.closure_from(&seeds, &program.name)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        // unnamed chunk dependencies and unparseable closures live in the shared module
        let mut forced: FxIndexSet<String> = self.config.forced_shared.iter().cloned().collect();
        forced.extend(map.unnamed_needs());
        forced.extend(
            map.declarations
                .values()
                .filter(|declaration| declaration.opaque)
                .map(|declaration| declaration.name.clone()),
        );
        let mut split_plan = plan(deps, forced);
        split_plan.settle(&graph, &map)?;
        info!(
            "Shared module holds {} of {} declarations",
            split_plan.shared.len(),
            map.declarations.len()
        );

        let shared_file = shared_file_name(stem);
        let mut modules = vec![OutputModule {
            file_name: shared_file.clone(),
            program: None,
            contents: assembler.shared_module(&split_plan.shared),
        }];
        for (program, split) in programs.iter().zip(&split_plan.programs) {
            debug!(
                "Program `{}`: {} private, {} shared",
                split.name,
                split.needs.len(),
                split.shared.len()
            );
            let import = SharedImport {
                alias: &self.config.shared_alias,
                file_name: &shared_file,
                names: &split.shared,
            };
            let contents = assembler.program_module(
                &split.name,
                &split.needs,
                table.text_of(program.init),
                Some(import),
            )?;
            modules.push(OutputModule {
                file_name: program_file_name(stem, &split.name),
                program: Some(split.name.clone()),
                contents,
            });
        }

        Ok(SplitResult {
            outcome: SplitOutcome::SplitProgramsOneShared,
            programs: program_names,
            modules,
        })
    }

    /// The namespace alias must not shadow a top-level declaration
    fn check_alias(&self, map: &DependencyMap, body: &str) -> Result<()> {
        match map.get(&self.config.shared_alias) {
            Some(declaration) => Err(SplitError::malformed(
                "declaration",
                format!(
                    "`{}` collides with the shared module alias",
                    self.config.shared_alias
                ),
                body,
                declaration.span.start,
            )),
            None => Ok(()),
        }
    }
}

/// `<stem>.shared.js`
pub fn shared_file_name(stem: &str) -> String {
    format!("{stem}.shared.js")
}

/// `<stem>.<Program>.js`
pub fn program_file_name(stem: &str, program: &str) -> String {
    format!("{stem}.{program}.js")
}
