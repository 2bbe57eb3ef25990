use super::bugs::BugReporter;
use super::resource::{might_close_any, OpenRule, Resource, ResourceId};
use super::{AnalysisError, Equivalence, Location, ResourceFrame, Settings};
use crate::jvm::class_graph::Hierarchy;
use crate::jvm::code::{AnyInstruction, Instruction, InvokeType};
use crate::jvm::{BinaryName, UnqualifiedName};
use std::collections::{BTreeMap, BTreeSet};

/// The instance of `source` flows into the instruction at `target`
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceEscape {
    pub source: ResourceId,
    pub target: Location,

    /// Passed as a non-receiver argument (as opposed to being the receiver)
    pub as_argument: bool,
}

/// Outcome of asking whether an instruction creates a resource
#[derive(Debug)]
pub enum Creation {
    /// Resource already in the method's collection
    Collected(ResourceId),

    /// New resource, not yet added to any collection
    Discovered(Resource),
}

/// Every resource of a method, found by sweeping its instructions once
#[derive(Debug, Default)]
pub struct ResourceCollection {
    resources: Vec<Resource>,
    creation_points: BTreeMap<Location, ResourceId>,

    /// Instructions that can take another resource in without it escaping: creations of
    /// resources returned by calls, and constructor calls of resource types
    wrapper_sites: BTreeSet<Location>,
}

impl ResourceCollection {
    pub fn new() -> ResourceCollection {
        ResourceCollection::default()
    }

    /// Add a resource that exists on method entry (a parameter)
    pub fn add_preexisting_resource(&mut self, resource: Resource) -> ResourceId {
        let id = ResourceId(self.resources.len());
        self.resources.push(resource);
        id
    }

    pub fn add_created_resource(&mut self, location: Location, resource: Resource) -> ResourceId {
        let id = ResourceId(self.resources.len());
        if resource.open_rule == OpenRule::OnCreation {
            self.wrapper_sites.insert(location);
        }
        self.resources.push(resource);
        self.creation_points.insert(location, id);
        id
    }

    pub fn add_constructor_site(&mut self, location: Location) {
        self.wrapper_sites.insert(location);
    }

    pub fn get_created_resource(&self, location: Location) -> Option<ResourceId> {
        self.creation_points.get(&location).copied()
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id.0)
    }

    pub fn resource_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        self.resources.get_mut(id.0)
    }

    /// Resources in the order they were added
    pub fn ids(&self) -> impl Iterator<Item = ResourceId> {
        (0..self.resources.len()).map(ResourceId)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Method-wide facts about resources, shared across the per-resource analyses
///
/// The tracker identifies creations and resource operations, and collects the open locations
/// and escapes that the analyses observe. Once every resource has been analyzed,
/// [`ResourceTracker::mark_transitive_uninteresting_escapes`] groups wrappers with what they wrap
/// and spreads the uninteresting mark along those chains.
pub struct ResourceTracker<'h> {
    bases: &'h [BinaryName],
    hierarchy: &'h dyn Hierarchy,
    debug: bool,

    creation_points: Option<BTreeMap<Location, ResourceId>>,
    wrapper_sites: BTreeSet<Location>,
    resource_count: usize,

    open_locations: BTreeMap<Location, ResourceId>,
    uninteresting: BTreeSet<ResourceId>,
    escapes: BTreeSet<ResourceEscape>,
    equivalence: Option<Equivalence>,
}

impl<'h> ResourceTracker<'h> {
    pub fn new(settings: &'h Settings, hierarchy: &'h dyn Hierarchy) -> ResourceTracker<'h> {
        ResourceTracker {
            bases: &settings.resource_bases,
            hierarchy,
            debug: settings.debug,
            creation_points: None,
            wrapper_sites: BTreeSet::new(),
            resource_count: 0,
            open_locations: BTreeMap::new(),
            uninteresting: BTreeSet::new(),
            escapes: BTreeSet::new(),
            equivalence: None,
        }
    }

    /// Whether developer trace lines are on
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// First tracked base category that a class falls under
    ///
    /// A base that can't be checked because of a missing class is reported and skipped.
    pub fn base_type_of(
        &self,
        class_name: &BinaryName,
        reporter: &mut dyn BugReporter,
    ) -> Option<BinaryName> {
        for base in self.bases {
            match self.hierarchy.is_subtype(class_name, base) {
                Ok(true) => return Some(base.clone()),
                Ok(false) => (),
                Err(failure) => reporter.report_missing_class(failure),
            }
        }
        None
    }

    /// Does the instruction create a resource?
    ///
    /// Once a collection has been set, only its creation points count.
    pub fn is_resource_creation(
        &self,
        location: Location,
        insn: &AnyInstruction,
        reporter: &mut dyn BugReporter,
    ) -> Option<Creation> {
        if let Some(creation_points) = &self.creation_points {
            return creation_points.get(&location).copied().map(Creation::Collected);
        }

        match insn {
            AnyInstruction::Regular(Instruction::Invoke(_, method)) => {
                let returned = method.descriptor.return_type.as_ref()?.as_object()?;
                let base = self.base_type_of(returned, reporter)?;
                Some(Creation::Discovered(Resource::returned_by_call(
                    location,
                    returned.clone(),
                    base,
                )))
            }
            AnyInstruction::Regular(Instruction::New(class_name)) => {
                let base = self.base_type_of(class_name, reporter)?;
                Some(Creation::Discovered(Resource::constructed(
                    location,
                    class_name.clone(),
                    base,
                )))
            }
            _ => None,
        }
    }

    /// Is the instruction a constructor call for some resource type?
    pub fn is_resource_constructor(
        &self,
        insn: &AnyInstruction,
        reporter: &mut dyn BugReporter,
    ) -> bool {
        match insn {
            AnyInstruction::Regular(Instruction::Invoke(InvokeType::Special, method))
                if method.name == UnqualifiedName::INIT =>
            {
                method
                    .class_name()
                    .map_or(false, |class_name| {
                        self.base_type_of(class_name, reporter).is_some()
                    })
            }
            _ => false,
        }
    }

    pub fn is_resource_open(
        &self,
        resource: &Resource,
        insn: &AnyInstruction,
        frame: &ResourceFrame,
    ) -> bool {
        resource.is_open_at(insn, frame)
    }

    pub fn is_resource_close(
        &self,
        resource: &Resource,
        insn: &AnyInstruction,
        frame: &ResourceFrame,
        reporter: &mut dyn BugReporter,
    ) -> bool {
        resource.is_close_at(insn, frame, self.hierarchy, reporter)
    }

    pub fn might_close_resource(&self, insn: &AnyInstruction) -> bool {
        might_close_any(insn)
    }

    /// Can a resource be passed in here without escaping?
    pub fn is_wrapper_site(&self, location: Location) -> bool {
        self.wrapper_sites.contains(&location)
    }

    /// Switch creation lookups over to a precomputed collection
    pub fn set_resource_collection(&mut self, collection: &ResourceCollection) {
        self.creation_points = Some(collection.creation_points.clone());
        self.wrapper_sites = collection.wrapper_sites.clone();
        self.resource_count = collection.len();
        for id in collection.ids() {
            if let Some(resource) = collection.resource(id) {
                if !resource.is_interesting() {
                    self.uninteresting.insert(id);
                }
            }
        }
    }

    /// Record where a resource got opened
    ///
    /// When two resources open at the same location, the one recorded last wins.
    pub fn add_open_location(&mut self, location: Location, id: ResourceId, resource: &Resource) {
        if self.debug {
            log::debug!("Resource {:?} ({}) opened at {:?}", id, resource.declared_type, location);
        }
        if let Some(previous) = self.open_locations.insert(location, id) {
            if previous != id && self.debug {
                log::debug!("Open location {:?} moved from {:?} to {:?}", location, previous, id);
            }
        }
        if !resource.is_interesting() {
            self.uninteresting.insert(id);
        }
    }

    pub fn add_escape(&mut self, source: ResourceId, target: Location, as_argument: bool) {
        let escape = ResourceEscape {
            source,
            target,
            as_argument,
        };
        if self.escapes.insert(escape) && self.debug {
            log::debug!("Escape {:?}", escape);
        }
    }

    pub fn escapes(&self) -> impl Iterator<Item = &ResourceEscape> + '_ {
        self.escapes.iter()
    }

    /// Group wrappers with what they wrap, and spread "uninteresting" from wrapped resources to
    /// their wrappers
    ///
    /// Escapes into anything other than an open location are dropped first. Running this more
    /// than once has no further effect.
    pub fn mark_transitive_uninteresting_escapes(&mut self) -> Result<(), AnalysisError> {
        let ResourceTracker {
            debug,
            resource_count,
            open_locations,
            uninteresting,
            escapes,
            equivalence,
            ..
        } = self;

        escapes.retain(|escape| {
            let keep = open_locations.contains_key(&escape.target);
            if !keep && *debug {
                log::debug!("Eliminating false escape {:?}", escape);
            }
            keep
        });

        let resource_count = *resource_count;
        let equivalence = equivalence.get_or_insert_with(|| Equivalence::new(resource_count));
        let known = |id: ResourceId| {
            if id.0 < resource_count {
                Ok(id)
            } else {
                Err(AnalysisError::UnknownResource(id))
            }
        };

        loop {
            let mut changed = false;
            for escape in escapes.iter() {
                let source = known(escape.source)?;
                let target = open_locations
                    .get(&escape.target)
                    .copied()
                    .ok_or(AnalysisError::MissingEscapeTarget {
                        source,
                        target: escape.target,
                    })
                    .and_then(known)?;

                if uninteresting.contains(&source) {
                    if uninteresting.insert(target) {
                        changed = true;
                        if *debug {
                            log::debug!("Uninteresting {:?} makes {:?} uninteresting", source, target);
                        }
                    }
                    equivalence.union(source, target);
                }
                if escape.as_argument {
                    equivalence.union(source, target);
                }
            }
            if !changed {
                return Ok(());
            }
        }
    }

    pub fn is_uninteresting(&self, id: ResourceId) -> bool {
        self.uninteresting.contains(&id)
    }

    /// Did the resource get passed into another resource's open location?
    pub fn is_wrapped(&self, id: ResourceId) -> bool {
        self.escapes.iter().any(|escape| {
            escape.source == id
                && escape.as_argument
                && self
                    .open_locations
                    .get(&escape.target)
                    .map_or(false, |target| *target != id)
        })
    }

    fn equivalence(&mut self) -> &mut Equivalence {
        let resource_count = self.resource_count;
        self.equivalence
            .get_or_insert_with(|| Equivalence::new(resource_count))
    }

    pub fn set_class_closed(&mut self, id: ResourceId) {
        if id.0 < self.resource_count {
            self.equivalence().set_closed(id);
        }
    }

    /// Is any resource grouped with this one closed?
    pub fn is_class_closed(&mut self, id: ResourceId) -> bool {
        id.0 < self.resource_count && self.equivalence().is_closed(id)
    }
}
