use std::collections::{BTreeMap, BTreeSet, VecDeque};

use indexmap::IndexMap;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::repository::{
    Candidate, CandidateRepository, CandidateSource, DependencyMetadata, EnvironmentFacts,
};
use crate::requirement::{DirectSource, Requirement};

use super::conflict::{ConflictLink, ResolutionError};
use super::{ResolutionGraph, ResolveError, ResolvedPackage};

#[derive(Clone, Debug, Default)]
pub struct ResolveOptions {
    pub cancel: CancelToken,
}

/// Who put a requirement on the queue.
#[derive(Clone, Debug)]
enum Origin {
    Root,
    Package { name: String, version: String },
}

impl Origin {
    fn label(&self) -> String {
        match self {
            Self::Root => "<root>".to_string(),
            Self::Package { name, version } => format!("{name}=={version}"),
        }
    }
}

#[derive(Clone, Debug)]
struct Tracked {
    requirement: Requirement,
    origin: Origin,
}

#[derive(Clone, Debug)]
struct ChosenNode {
    candidate: Candidate,
    metadata: DependencyMetadata,
    activated_extras: BTreeSet<String>,
    introduced_by: Origin,
}

/// The whole mutable search position. Cloned into each [`Choice`] so
/// backtracking is pop-and-restore, never unwinding.
#[derive(Clone, Debug, Default)]
struct SearchState {
    queue: VecDeque<Tracked>,
    constraints: BTreeMap<String, Vec<Tracked>>,
    chosen: IndexMap<String, ChosenNode>,
}

/// One decision point: the package, its untried candidates in repository
/// order, and the state to restore before retrying.
struct Choice {
    name: String,
    untried: VecDeque<Candidate>,
    saved: SearchState,
    trigger: Tracked,
}

struct Conflict {
    name: String,
    incoming: Tracked,
}

/// Resolves `roots` to a graph with exactly one candidate per referenced
/// name, or reports the minimal conflicting requirement chain.
///
/// Identical repository responses yield identical output: every iteration
/// order here is explicit (queue order, name-sorted dependency enqueueing,
/// declared candidate order), never incidental to a hash map.
///
/// # Errors
/// [`ResolveError::Resolution`] on unsatisfiable constraints,
/// [`ResolveError::Repository`] on lookup faults, and
/// [`ResolveError::Cancelled`] when the token fires between steps.
pub fn resolve(
    roots: &[Requirement],
    repository: &dyn CandidateRepository,
    env: &EnvironmentFacts,
    options: &ResolveOptions,
) -> Result<ResolutionGraph, ResolveError> {
    let mut state = SearchState {
        queue: seed_queue(roots)?,
        ..SearchState::default()
    };
    let mut stack: Vec<Choice> = Vec::new();

    loop {
        if options.cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        let Some(tracked) = state.queue.pop_front() else {
            return Ok(build_graph(&state, env));
        };
        if !tracked.requirement.applies(&env.markers) {
            debug!(requirement = %tracked.requirement, "requirement_excluded_by_marker");
            continue;
        }
        step(&mut state, &mut stack, repository, env, tracked)?;
    }
}

fn step(
    state: &mut SearchState,
    stack: &mut Vec<Choice>,
    repository: &dyn CandidateRepository,
    env: &EnvironmentFacts,
    tracked: Tracked,
) -> Result<(), ResolveError> {
    let name = tracked.requirement.normalized().to_string();

    if let Some(node) = state.chosen.get(&name) {
        if node.candidate.satisfies(&tracked.requirement) {
            let extras: Vec<String> = tracked.requirement.extras().to_vec();
            state
                .constraints
                .entry(name.clone())
                .or_default()
                .push(tracked);
            activate_extras(state, &name, &extras);
            return Ok(());
        }
        // A pinned reference never loses to a range and is never silently
        // overridden: incompatibility around a direct candidate is final.
        let direct_involved = matches!(node.candidate.source, CandidateSource::Direct(_))
            || tracked.requirement.is_direct();
        let conflict = Conflict {
            name,
            incoming: tracked,
        };
        if direct_involved {
            return Err(resolution_error(state, &conflict).into());
        }
        return backtrack(state, stack, repository, &conflict);
    }

    state
        .constraints
        .entry(name.clone())
        .or_default()
        .push(tracked.clone());
    let candidates = gather_candidates(state, repository, env, &name)?;
    if candidates.is_empty() {
        let conflict = Conflict {
            name: name.clone(),
            incoming: tracked,
        };
        let has_direct = state.constraints[&name]
            .iter()
            .any(|entry| entry.requirement.is_direct());
        if has_direct {
            return Err(resolution_error(state, &conflict).into());
        }
        return backtrack(state, stack, repository, &conflict);
    }

    let saved = state.clone();
    let mut untried = VecDeque::from(candidates);
    let first = untried.pop_front().expect("candidate list checked non-empty");
    apply_choice(state, repository, &name, first, &tracked)?;
    stack.push(Choice {
        name,
        untried,
        saved,
        trigger: tracked,
    });
    Ok(())
}

/// Merges duplicate roots and orders direct references ahead of ranges so
/// a pinned reference always decides its package first.
fn seed_queue(roots: &[Requirement]) -> Result<VecDeque<Tracked>, ResolveError> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut direct_refs: BTreeMap<String, Requirement> = BTreeMap::new();
    let mut direct: Vec<Tracked> = Vec::new();
    let mut ranged: Vec<Tracked> = Vec::new();

    for requirement in roots {
        if !seen.insert(requirement.canonical().to_string()) {
            continue;
        }
        let tracked = Tracked {
            requirement: requirement.clone(),
            origin: Origin::Root,
        };
        match requirement.source() {
            Some(source) => {
                if let Some(existing) = direct_refs.get(requirement.normalized()) {
                    if existing.source().map(DirectSource::reference) != Some(source.reference()) {
                        return Err(ResolutionError {
                            package: requirement.normalized().to_string(),
                            links: vec![
                                ConflictLink {
                                    requirement: existing.canonical().to_string(),
                                    path: vec!["<root>".to_string()],
                                },
                                ConflictLink {
                                    requirement: requirement.canonical().to_string(),
                                    path: vec!["<root>".to_string()],
                                },
                            ],
                        }
                        .into());
                    }
                    continue;
                }
                direct_refs.insert(requirement.normalized().to_string(), requirement.clone());
                direct.push(tracked);
            }
            None => ranged.push(tracked),
        }
    }
    Ok(direct.into_iter().chain(ranged).collect())
}

/// Candidates for `name` acceptable to every accumulated contributor, in
/// the repository's declared (newest-first) order.
fn gather_candidates(
    state: &SearchState,
    repository: &dyn CandidateRepository,
    env: &EnvironmentFacts,
    name: &str,
) -> Result<Vec<Candidate>, ResolveError> {
    let contributors = state
        .constraints
        .get(name)
        .expect("contributors recorded before candidate search");
    let query = contributors
        .iter()
        .find(|entry| entry.requirement.is_direct())
        .or_else(|| contributors.last())
        .expect("at least one contributor");
    let found = repository.find_candidates(&query.requirement, env)?;
    Ok(found
        .into_iter()
        .filter(|candidate| {
            contributors
                .iter()
                .all(|entry| candidate.satisfies(&entry.requirement))
        })
        .collect())
}

fn apply_choice(
    state: &mut SearchState,
    repository: &dyn CandidateRepository,
    name: &str,
    candidate: Candidate,
    trigger: &Tracked,
) -> Result<(), ResolveError> {
    debug!(package = %name, version = %candidate.version, "candidate_selected");
    let metadata = repository.dependencies(&candidate)?;
    let origin = Origin::Package {
        name: name.to_string(),
        version: candidate.version.to_string(),
    };

    let mut pending: Vec<Requirement> = metadata.requires.clone();
    for extra in trigger.requirement.extras() {
        if let Some(bucket) = metadata.extra_requires.get(extra) {
            pending.extend(bucket.iter().cloned());
        }
    }
    pending.sort_by(|a, b| {
        a.normalized()
            .cmp(b.normalized())
            .then_with(|| a.canonical().cmp(b.canonical()))
    });
    pending.dedup_by(|a, b| a.canonical() == b.canonical());

    let unseen: Vec<String> = pending
        .iter()
        .map(|requirement| requirement.normalized().to_string())
        .filter(|dep| !state.chosen.contains_key(dep))
        .collect();
    if !unseen.is_empty() {
        repository.prefetch(&unseen);
    }

    for requirement in pending {
        state.queue.push_back(Tracked {
            requirement,
            origin: origin.clone(),
        });
    }
    state.chosen.insert(
        name.to_string(),
        ChosenNode {
            candidate,
            metadata,
            activated_extras: trigger.requirement.extras().iter().cloned().collect(),
            introduced_by: trigger.origin.clone(),
        },
    );
    Ok(())
}

/// Enqueues the extras-gated buckets of an already-chosen candidate for
/// any extras not activated before.
fn activate_extras(state: &mut SearchState, name: &str, extras: &[String]) {
    let Some(node) = state.chosen.get_mut(name) else {
        return;
    };
    let mut added: Vec<Requirement> = Vec::new();
    for extra in extras {
        if node.activated_extras.insert(extra.clone()) {
            if let Some(bucket) = node.metadata.extra_requires.get(extra) {
                added.extend(bucket.iter().cloned());
            }
        }
    }
    if added.is_empty() {
        return;
    }
    let origin = Origin::Package {
        name: name.to_string(),
        version: node.candidate.version.to_string(),
    };
    added.sort_by(|a, b| a.normalized().cmp(b.normalized()));
    for requirement in added {
        state.queue.push_back(Tracked {
            requirement,
            origin: origin.clone(),
        });
    }
}

/// Pops the most recent implicated choice, restores its saved state, and
/// retries the next untried candidate. Exhausting a choice propagates the
/// conflict to the choice below it; an empty stack means the conflict is
/// rooted and unsatisfiable.
fn backtrack(
    state: &mut SearchState,
    stack: &mut Vec<Choice>,
    repository: &dyn CandidateRepository,
    conflict: &Conflict,
) -> Result<(), ResolveError> {
    debug!(package = %conflict.name, requirement = %conflict.incoming.requirement, "conflict");
    let implicated = implicated_packages(state, conflict);
    loop {
        let Some(mut choice) = stack.pop() else {
            return Err(resolution_error(state, conflict).into());
        };
        if !implicated.contains(&choice.name) {
            continue;
        }
        while let Some(candidate) = choice.untried.pop_front() {
            let acceptable = choice
                .saved
                .constraints
                .get(&choice.name)
                .is_some_and(|contributors| {
                    contributors
                        .iter()
                        .all(|entry| candidate.satisfies(&entry.requirement))
                });
            if !acceptable {
                continue;
            }
            let mut restored = choice.saved.clone();
            apply_choice(&mut restored, repository, &choice.name, candidate, &choice.trigger)?;
            debug!(package = %choice.name, "backtracked");
            *state = restored;
            stack.push(choice);
            return Ok(());
        }
    }
}

/// The conflict package plus every package whose choice contributed a
/// constraint on it, transitively up to the roots.
fn implicated_packages(state: &SearchState, conflict: &Conflict) -> BTreeSet<String> {
    let mut implicated = BTreeSet::new();
    implicated.insert(conflict.name.clone());
    let mut origins: Vec<Origin> = vec![conflict.incoming.origin.clone()];
    if let Some(contributors) = state.constraints.get(&conflict.name) {
        origins.extend(contributors.iter().map(|entry| entry.origin.clone()));
    }
    while let Some(origin) = origins.pop() {
        let Origin::Package { name, .. } = origin else {
            continue;
        };
        if !implicated.insert(name.clone()) {
            continue;
        }
        if let Some(node) = state.chosen.get(&name) {
            origins.push(node.introduced_by.clone());
        }
        if let Some(contributors) = state.constraints.get(&name) {
            origins.extend(contributors.iter().map(|entry| entry.origin.clone()));
        }
    }
    implicated
}

fn resolution_error(state: &SearchState, conflict: &Conflict) -> ResolutionError {
    let mut links: Vec<ConflictLink> = Vec::new();
    let mut push = |tracked: &Tracked| {
        let link = ConflictLink {
            requirement: tracked.requirement.canonical().to_string(),
            path: trace(state, &tracked.origin),
        };
        if !links.contains(&link) {
            links.push(link);
        }
    };
    if let Some(contributors) = state.constraints.get(&conflict.name) {
        for tracked in contributors {
            push(tracked);
        }
    }
    push(&conflict.incoming);
    ResolutionError {
        package: conflict.name.clone(),
        links,
    }
}

/// Provenance chain for an origin, outermost (root) first. Cycles in the
/// chosen graph terminate the walk instead of looping.
fn trace(state: &SearchState, origin: &Origin) -> Vec<String> {
    let mut path = Vec::new();
    let mut guard: BTreeSet<String> = BTreeSet::new();
    let mut current = origin.clone();
    loop {
        match current {
            Origin::Root => {
                path.push("<root>".to_string());
                break;
            }
            Origin::Package { name, version } => {
                path.push(format!("{name}=={version}"));
                if !guard.insert(name.clone()) {
                    break;
                }
                match state.chosen.get(&name) {
                    Some(node) => current = node.introduced_by.clone(),
                    None => break,
                }
            }
        }
    }
    path.reverse();
    path
}

fn build_graph(state: &SearchState, env: &EnvironmentFacts) -> ResolutionGraph {
    let mut packages = BTreeMap::new();
    for (name, node) in &state.chosen {
        let mut requires: Vec<Requirement> = node
            .metadata
            .requires
            .iter()
            .filter(|requirement| requirement.applies(&env.markers))
            .cloned()
            .collect();
        for extra in &node.activated_extras {
            if let Some(bucket) = node.metadata.extra_requires.get(extra) {
                requires.extend(
                    bucket
                        .iter()
                        .filter(|requirement| requirement.applies(&env.markers))
                        .cloned(),
                );
            }
        }
        requires.sort_by(|a, b| {
            a.normalized()
                .cmp(b.normalized())
                .then_with(|| a.canonical().cmp(b.canonical()))
        });
        requires.dedup_by(|a, b| a.canonical() == b.canonical());

        let contributors = state
            .constraints
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut requested_by: Vec<String> = contributors
            .iter()
            .map(|entry| entry.origin.label())
            .collect();
        requested_by.sort();
        requested_by.dedup();

        packages.insert(
            name.clone(),
            ResolvedPackage {
                candidate: node.candidate.clone(),
                requires,
                requested_by,
                root_chain: trace(state, &node.introduced_by),
                extras: node.activated_extras.iter().cloned().collect(),
                marker: combined_marker(contributors),
            },
        );
    }
    ResolutionGraph::from_packages(packages)
}

/// A lock entry keeps a conditional predicate only when every requester
/// was itself conditional; one unconditional requester makes it
/// unconditional.
fn combined_marker(contributors: &[Tracked]) -> Option<String> {
    let mut markers: Vec<String> = Vec::new();
    for tracked in contributors {
        match tracked.requirement.marker() {
            Some(marker) => markers.push(marker.to_string()),
            None => return None,
        }
    }
    markers.sort();
    markers.dedup();
    match markers.len() {
        0 => None,
        1 => Some(markers.remove(0)),
        _ => Some(markers.join(" or ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{ReleaseSpec, StaticRepository};

    fn parse(spec: &str) -> Requirement {
        Requirement::parse(spec).expect("valid requirement")
    }

    fn resolve_ok(
        roots: &[&str],
        repository: &StaticRepository,
    ) -> Result<ResolutionGraph, ResolveError> {
        let roots: Vec<Requirement> = roots.iter().map(|spec| parse(spec)).collect();
        let env = EnvironmentFacts::testing("3.11.4");
        resolve(&roots, repository, &env, &ResolveOptions::default())
    }

    fn transitive_repo() -> StaticRepository {
        let mut repo = StaticRepository::default();
        repo.add(ReleaseSpec::new("requests", "2.31.0").requires(&["idna>=2,<4", "urllib3>=1.26"]));
        repo.add(ReleaseSpec::new("requests", "2.19.0").requires(&["idna>=2,<3", "urllib3>=1.20"]));
        repo.add(ReleaseSpec::new("idna", "3.6"));
        repo.add(ReleaseSpec::new("idna", "2.10"));
        repo.add(ReleaseSpec::new("urllib3", "2.1.0"));
        repo.add(ReleaseSpec::new("urllib3", "1.26.18"));
        repo
    }

    #[test]
    fn resolves_transitive_closure_newest_first() {
        let graph = resolve_ok(&["requests"], &transitive_repo()).unwrap();
        let picked: Vec<(String, String)> = graph
            .packages()
            .map(|pkg| (pkg.candidate.normalized.clone(), pkg.candidate.version.to_string()))
            .collect();
        assert_eq!(
            picked,
            vec![
                ("idna".to_string(), "3.6".to_string()),
                ("requests".to_string(), "2.31.0".to_string()),
                ("urllib3".to_string(), "2.1.0".to_string()),
            ]
        );
        let idna = graph.get("idna").unwrap();
        assert_eq!(idna.requested_by, vec!["requests==2.31.0"]);
        assert_eq!(idna.root_chain, vec!["<root>", "requests==2.31.0"]);
    }

    #[test]
    fn identical_inputs_resolve_identically() {
        let repo = transitive_repo();
        let left = resolve_ok(&["requests"], &repo).unwrap();
        let right = resolve_ok(&["requests"], &repo).unwrap();
        assert_eq!(format!("{left:?}"), format!("{right:?}"));
    }

    #[test]
    fn backtracks_to_an_older_release_on_conflict() {
        let mut repo = StaticRepository::default();
        repo.add(ReleaseSpec::new("alpha", "2.0.0").requires(&["shared>=2"]));
        repo.add(ReleaseSpec::new("alpha", "1.0.0").requires(&["shared>=1,<2"]));
        repo.add(ReleaseSpec::new("beta", "1.0.0").requires(&["shared<2"]));
        repo.add(ReleaseSpec::new("shared", "2.0.0"));
        repo.add(ReleaseSpec::new("shared", "1.5.0"));

        let graph = resolve_ok(&["alpha", "beta"], &repo).unwrap();
        assert_eq!(graph.get("alpha").unwrap().candidate.version.to_string(), "1.0.0");
        assert_eq!(graph.get("shared").unwrap().candidate.version.to_string(), "1.5.0");
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn disjoint_roots_report_both_chains() {
        let mut repo = StaticRepository::default();
        repo.add(ReleaseSpec::new("demo", "2.1.0"));
        repo.add(ReleaseSpec::new("demo", "1.0.0"));

        let err = resolve_ok(&["demo>=2", "demo<2"], &repo).unwrap_err();
        let ResolveError::Resolution(error) = err else {
            panic!("expected resolution error, got {err:?}");
        };
        assert_eq!(error.package, "demo");
        let requirements: Vec<&str> = error
            .links
            .iter()
            .map(|link| link.requirement.as_str())
            .collect();
        assert!(requirements.contains(&"demo>=2"));
        assert!(requirements.contains(&"demo<2"));
        assert!(error.links.iter().all(|link| link.path == ["<root>"]));
    }

    #[test]
    fn conflict_chain_names_the_intermediate_package() {
        let mut repo = StaticRepository::default();
        repo.add(ReleaseSpec::new("legacy", "1.0.0").requires(&["shared<1"]));
        repo.add(ReleaseSpec::new("modern", "1.0.0").requires(&["shared>=2"]));
        repo.add(ReleaseSpec::new("shared", "2.0.0"));
        repo.add(ReleaseSpec::new("shared", "0.9.0"));

        let err = resolve_ok(&["legacy", "modern"], &repo).unwrap_err();
        let ResolveError::Resolution(error) = err else {
            panic!("expected resolution error, got {err:?}");
        };
        assert_eq!(error.package, "shared");
        assert!(error
            .links
            .iter()
            .any(|link| link.via().contains("legacy==1.0.0")));
        assert!(error
            .links
            .iter()
            .any(|link| link.via().contains("modern==1.0.0")));
    }

    #[test]
    fn false_marker_drops_requirement_without_error() {
        let repo = StaticRepository::default();
        let graph = resolve_ok(&[r#"wintool>=1 ; sys_platform == "win32""#], &repo).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn extras_pull_in_gated_dependencies() {
        let mut repo = StaticRepository::default();
        repo.add(
            ReleaseSpec::new("requests", "2.31.0")
                .requires(&["idna>=2"])
                .extra("socks", &["pysocks>=1.5"]),
        );
        repo.add(ReleaseSpec::new("idna", "3.6"));
        repo.add(ReleaseSpec::new("pysocks", "1.7.1"));

        let graph = resolve_ok(&["requests[socks]"], &repo).unwrap();
        assert!(graph.get("pysocks").is_some());
        assert_eq!(graph.get("requests").unwrap().extras, vec!["socks"]);

        let plain = resolve_ok(&["requests"], &repo).unwrap();
        assert!(plain.get("pysocks").is_none());
    }

    #[test]
    fn extras_activate_on_an_already_chosen_candidate() {
        let mut repo = StaticRepository::default();
        repo.add(
            ReleaseSpec::new("core", "1.0.0").extra("cache", &["diskcache>=5"]),
        );
        repo.add(ReleaseSpec::new("wrapper", "1.0.0").requires(&["core[cache]>=1"]));
        repo.add(ReleaseSpec::new("diskcache", "5.6.0"));

        let graph = resolve_ok(&["core", "wrapper"], &repo).unwrap();
        assert!(graph.get("diskcache").is_some());
        assert_eq!(graph.get("core").unwrap().extras, vec!["cache"]);
    }

    #[test]
    fn direct_reference_conflicting_with_range_fails_immediately() {
        let mut repo = StaticRepository::default();
        repo.add(
            ReleaseSpec::new("demo", "9.9.9")
                .direct_url("https://example.invalid/demo-9.9.9-py3-none-any.whl"),
        );
        repo.add(ReleaseSpec::new("demo", "1.0.0"));

        let err = resolve_ok(
            &[
                "demo @ https://example.invalid/demo-9.9.9-py3-none-any.whl",
                "demo<5",
            ],
            &repo,
        )
        .unwrap_err();
        let ResolveError::Resolution(error) = err else {
            panic!("expected resolution error, got {err:?}");
        };
        assert_eq!(error.package, "demo");
        assert!(error
            .links
            .iter()
            .any(|link| link.requirement.contains("@ https://example.invalid/")));
        assert!(error.links.iter().any(|link| link.requirement == "demo<5"));
    }

    #[test]
    fn direct_reference_wins_when_ranges_agree() {
        let mut repo = StaticRepository::default();
        repo.add(
            ReleaseSpec::new("demo", "9.9.9")
                .direct_url("https://example.invalid/demo-9.9.9-py3-none-any.whl"),
        );
        repo.add(ReleaseSpec::new("demo", "1.0.0"));

        let graph = resolve_ok(
            &[
                "demo>=1",
                "demo @ https://example.invalid/demo-9.9.9-py3-none-any.whl",
            ],
            &repo,
        )
        .unwrap();
        let demo = graph.get("demo").unwrap();
        assert_eq!(demo.candidate.version.to_string(), "9.9.9");
        assert!(matches!(demo.candidate.source, CandidateSource::Direct(_)));
    }

    #[test]
    fn unknown_package_surfaces_the_requesting_chain() {
        let repo = StaticRepository::default();
        let err = resolve_ok(&["ghost>=1"], &repo).unwrap_err();
        let ResolveError::Resolution(error) = err else {
            panic!("expected resolution error, got {err:?}");
        };
        assert_eq!(error.package, "ghost");
        assert_eq!(error.links[0].requirement, "ghost>=1");
        assert_eq!(error.links[0].path, vec!["<root>"]);
    }

    #[test]
    fn duplicate_roots_are_merged_before_search() {
        let mut repo = StaticRepository::default();
        repo.add(ReleaseSpec::new("demo", "1.0.0"));
        let graph = resolve_ok(&["demo>=1", "demo >= 1"], &repo).unwrap();
        assert_eq!(graph.get("demo").unwrap().requested_by, vec!["<root>"]);
    }

    #[test]
    fn cancellation_stops_between_steps() {
        let mut repo = StaticRepository::default();
        repo.add(ReleaseSpec::new("demo", "1.0.0"));
        let options = ResolveOptions::default();
        options.cancel.cancel();
        let env = EnvironmentFacts::testing("3.11.4");
        let err = resolve(&[parse("demo")], &repo, &env, &options).unwrap_err();
        assert!(matches!(err, ResolveError::Cancelled));
    }

    #[test]
    fn marker_gated_requesters_keep_the_predicate() {
        let mut repo = StaticRepository::default();
        repo.add(ReleaseSpec::new("demo", "1.0.0"));
        let graph = resolve_ok(&[r#"demo>=1 ; python_version >= "3.8""#], &repo).unwrap();
        let demo = graph.get("demo").unwrap();
        assert!(demo
            .marker
            .as_deref()
            .is_some_and(|marker| marker.contains("python_version")));
    }
}
