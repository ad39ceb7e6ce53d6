/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! The transitive-closure walk: an iterative breadth-first worklist over
//! the direct-dependency resolution, with explicit-path cycle detection
//! and closure-wide `!!` exclude handling.
//!
//! Each frontier's direct-dependency queries fan out concurrently, but
//! discovery order is defined by the deterministic frontier order, never
//! by async completion order. The first fatal error cancels the remaining
//! in-flight queries; no partial result is returned.

use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

use dupe::Dupe;
use futures::future::try_join_all;
use gantry_core::address::parse_address;
use gantry_core::address::Address;
use gantry_node::core_fields::DEPENDENCIES;
use gantry_node::deps::DependenciesField;
use gantry_node::target::Target;
use starlark_map::small_map::SmallMap;
use starlark_map::small_set::SmallSet;

use crate::dependencies::DependenciesRequest;
use crate::graph::TargetGraph;

/// A request for the full transitive closure reachable from `roots`.
#[derive(Debug, Clone)]
pub struct TransitiveTargetsRequest {
    pub roots: Vec<Address>,
    pub include_special_cased_deps: bool,
}

impl TransitiveTargetsRequest {
    pub fn new(roots: Vec<Address>) -> TransitiveTargetsRequest {
        TransitiveTargetsRequest {
            roots,
            include_special_cased_deps: false,
        }
    }

    pub fn include_special_cased_deps(mut self) -> TransitiveTargetsRequest {
        self.include_special_cased_deps = true;
        self
    }
}

/// The result of a closure walk. `dependencies` holds every target reached
/// via dependency edges in first-discovery order; a root reached that way
/// appears in both. `closure` is roots then dependencies, deduplicated by
/// address.
#[derive(Debug)]
pub struct TransitiveTargets {
    pub roots: Vec<Target>,
    pub dependencies: Vec<Target>,
}

impl TransitiveTargets {
    pub fn closure(&self) -> Vec<Target> {
        let mut seen: SmallSet<Address> = SmallSet::new();
        let mut closure = Vec::with_capacity(self.roots.len() + self.dependencies.len());
        for target in self.roots.iter().chain(self.dependencies.iter()) {
            if seen.insert(target.address().dupe()) {
                closure.push(target.dupe());
            }
        }
        closure
    }
}

/// A dependency cycle that is not tolerated: `path` runs from the walk
/// root to the repeated node (inclusive at both ends), and `subject` is
/// the repeated node.
#[derive(Debug)]
pub struct CycleError {
    pub subject: Address,
    pub path: Vec<Address>,
}

impl Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "The dependency graph contained a cycle:")?;
        for (i, address) in self.path.iter().enumerate() {
            if i + 1 == self.path.len() {
                writeln!(f, "  {}", address)?;
            } else {
                writeln!(f, "  {} ->", address)?;
            }
        }
        write!(
            f,
            "To fix this, first verify if your code has an actual import cycle. If it does, \
             you likely need to re-architect your code to avoid the cycle."
        )
    }
}

impl Error for CycleError {}

/// Detect non-tolerated cycles in the discovered edge mapping via an
/// iterative depth-first walk with an explicit recursion-path stack.
///
/// A cycle is tolerated iff every node on the cycle is a file-level
/// sub-target: those represent intra-file dependencies the engine can
/// still schedule independently. Whole-target or mixed cycles are fatal.
fn detect_cycles(
    roots: &[Address],
    dependency_mapping: &SmallMap<Address, Vec<Address>>,
) -> Result<(), CycleError> {
    let mut done: HashSet<Address> = HashSet::new();

    for root in roots {
        if done.contains(root) {
            continue;
        }
        // (node, index of the next child to visit)
        let mut stack: Vec<(Address, usize)> = vec![(root.dupe(), 0)];
        let mut path: Vec<Address> = vec![root.dupe()];
        let mut on_path: HashSet<Address> = HashSet::new();
        on_path.insert(root.dupe());

        while let Some((node, next_child)) = stack.last_mut() {
            let children = dependency_mapping
                .get(&*node)
                .map(|c| c.as_slice())
                .unwrap_or(&[]);
            let child = if *next_child < children.len() {
                let child = children[*next_child].dupe();
                *next_child += 1;
                Some(child)
            } else {
                None
            };
            match child {
                Some(child) if on_path.contains(&child) => {
                    let cycle_start = path
                        .iter()
                        .position(|a| *a == child)
                        .unwrap_or(0);
                    let cycle_is_file_level = path[cycle_start..]
                        .iter()
                        .all(|a| a.is_file_target());
                    if !cycle_is_file_level {
                        let mut cycle_path = path.clone();
                        cycle_path.push(child.dupe());
                        return Err(CycleError {
                            subject: child,
                            path: cycle_path,
                        });
                    }
                }
                Some(child) => {
                    if !done.contains(&child) {
                        on_path.insert(child.dupe());
                        path.push(child.dupe());
                        stack.push((child, 0));
                    }
                }
                None => {
                    stack.pop();
                    if let Some(finished) = path.pop() {
                        on_path.remove(&finished);
                        done.insert(finished);
                    }
                }
            }
        }
    }
    Ok(())
}

impl TargetGraph {
    async fn direct_dependencies(
        &self,
        target: &Target,
        include_special_cased_deps: bool,
    ) -> anyhow::Result<Vec<Address>> {
        if !target.has_field(&DEPENDENCIES) {
            return Ok(Vec::new());
        }
        let mut request = DependenciesRequest::new(target.get(&DEPENDENCIES)?);
        if include_special_cased_deps {
            request = request.include_special_cased_deps();
        }
        self.resolve_dependencies(&request).await
    }

    /// Resolve the `!!` transitive excludes declared anywhere in the
    /// closure. An excluded base target removes itself and its file-level
    /// sub-targets; an excluded file address removes exactly itself.
    fn transitive_exclude_addresses(
        &self,
        targets: &[&Target],
    ) -> anyhow::Result<SmallSet<Address>> {
        let mut excludes: SmallSet<Address> = SmallSet::new();
        for target in targets {
            if !target.has_field(&DEPENDENCIES) {
                continue;
            }
            let field = target.get(&DEPENDENCIES)?;
            let view = DependenciesField::new(&field)?;
            for unparsed in view.unevaluated_transitive_excludes() {
                let origin = format!(
                    "the `{}` field of {}",
                    field.alias(),
                    target.address()
                );
                excludes.insert(parse_address(
                    unparsed,
                    target.address().spec_path(),
                    &origin,
                )?);
            }
        }
        Ok(excludes)
    }

    /// Walk outward from `roots` to the full transitive dependency closure,
    /// failing on non-tolerated cycles.
    pub async fn transitive_targets(
        &self,
        request: &TransitiveTargetsRequest,
    ) -> anyhow::Result<TransitiveTargets> {
        let roots: Vec<Target> = self.unexpanded_targets(&request.roots).await?;

        // Breadth-first worklist. `discovered` tracks addresses already
        // appended to `dependencies`; every node entering a frontier has
        // its direct dependencies resolved exactly once.
        let mut dependency_mapping: SmallMap<Address, Vec<Address>> = SmallMap::new();
        let mut targets_by_address: SmallMap<Address, Target> = SmallMap::new();
        let mut discovered: SmallSet<Address> = SmallSet::new();
        let mut dependencies: Vec<Target> = Vec::new();

        for root in &roots {
            targets_by_address.insert(root.address().dupe(), root.dupe());
        }

        let mut frontier: Vec<Target> = {
            let mut seen: SmallSet<Address> = SmallSet::new();
            roots
                .iter()
                .filter(|t| seen.insert(t.address().dupe()))
                .map(|t| t.dupe())
                .collect()
        };

        while !frontier.is_empty() {
            // Fan out the frontier's dependency queries; merge in frontier
            // order.
            let direct = try_join_all(frontier.iter().map(|target| {
                self.direct_dependencies(target, request.include_special_cased_deps)
            }))
            .await?;

            let mut newly_discovered: Vec<Address> = Vec::new();
            let mut queued: SmallSet<Address> = SmallSet::new();
            for (target, deps) in frontier.iter().zip(direct) {
                for dep in &deps {
                    if discovered.contains(dep) || queued.contains(dep) {
                        continue;
                    }
                    if let Some(known) = targets_by_address.get(dep) {
                        // A root rediscovered through an edge still counts
                        // as a dependency; its own edges were already
                        // expanded.
                        discovered.insert(dep.dupe());
                        dependencies.push(known.dupe());
                    } else {
                        queued.insert(dep.dupe());
                        newly_discovered.push(dep.dupe());
                    }
                }
                dependency_mapping.insert(target.address().dupe(), deps);
            }

            let resolved =
                try_join_all(newly_discovered.iter().map(|a| self.resolve_target(a))).await?;
            let mut next_frontier: Vec<Target> = Vec::new();
            for (address, target) in newly_discovered.into_iter().zip(resolved) {
                discovered.insert(address.dupe());
                targets_by_address.insert(address, target.dupe());
                dependencies.push(target.dupe());
                next_frontier.push(target);
            }
            frontier = next_frontier;
        }

        detect_cycles(
            &request.roots,
            &dependency_mapping,
        )?;

        // Apply `!!` excludes declared anywhere in the closure. Roots are
        // kept: excludes trim dependencies, not the query's inputs.
        let all_targets: Vec<&Target> =
            roots.iter().chain(dependencies.iter()).collect();
        let excludes = self.transitive_exclude_addresses(&all_targets)?;
        if !excludes.is_empty() {
            dependencies.retain(|t| {
                let address = t.address();
                !excludes.contains(address)
                    && (address.is_base_target()
                        || !excludes.contains(&address.base_address()))
            });
        }

        Ok(TransitiveTargets {
            roots,
            dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use gantry_core::address::Address;
    use gantry_core::address::TargetName;
    use gantry_core::package_path::PackagePath;
    use starlark_map::small_map::SmallMap;

    use crate::transitive::detect_cycles;

    fn addr(name: &str) -> Address {
        Address::new(PackagePath::root(), TargetName::new(name).unwrap())
    }

    fn file_addr(name: &str, file: &str) -> Address {
        addr(name).subtarget_address(file).unwrap()
    }

    fn mapping(edges: &[(&Address, &[&Address])]) -> SmallMap<Address, Vec<Address>> {
        edges
            .iter()
            .map(|(from, to)| {
                (
                    (*from).clone(),
                    to.iter().map(|a| (*a).clone()).collect::<Vec<Address>>(),
                )
            })
            .collect()
    }

    #[test]
    fn test_self_cycle_path() {
        let t1 = addr("t1");
        let err = detect_cycles(&[t1.clone()], &mapping(&[(&t1, &[&t1])])).unwrap_err();
        assert_eq!(err.subject, t1);
        assert_eq!(err.path, vec![t1.clone(), t1]);
    }

    #[test]
    fn test_direct_cycle_path() {
        let t1 = addr("t1");
        let t2 = addr("t2");
        let err = detect_cycles(
            &[t1.clone()],
            &mapping(&[(&t1, &[&t2]), (&t2, &[&t1])]),
        )
        .unwrap_err();
        assert_eq!(err.subject, t1);
        assert_eq!(err.path, vec![t1.clone(), t2, t1]);
    }

    #[test]
    fn test_indirect_cycle_path_starts_at_walk_root() {
        let t1 = addr("t1");
        let t2 = addr("t2");
        let t3 = addr("t3");
        let err = detect_cycles(
            &[t1.clone()],
            &mapping(&[(&t1, &[&t2]), (&t2, &[&t3]), (&t3, &[&t2])]),
        )
        .unwrap_err();
        assert_eq!(err.subject, t2);
        assert_eq!(err.path, vec![t1, t2.clone(), t3, t2]);
    }

    #[test]
    fn test_file_level_cycle_tolerated() {
        let f1 = file_addr("t1", "a.txt");
        let f2 = file_addr("t2", "b.txt");
        detect_cycles(
            &[f1.clone()],
            &mapping(&[(&f1, &[&f2]), (&f2, &[&f1])]),
        )
        .unwrap();
    }

    #[test]
    fn test_mixed_cycle_is_fatal() {
        let base = addr("t1");
        let file = file_addr("t2", "b.txt");
        let err = detect_cycles(
            &[base.clone()],
            &mapping(&[(&base, &[&file]), (&file, &[&base])]),
        )
        .unwrap_err();
        assert_eq!(err.subject, base);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let root = addr("root");
        let left = addr("left");
        let right = addr("right");
        let base = addr("base");
        detect_cycles(
            &[root.clone()],
            &mapping(&[
                (&root, &[&left, &right]),
                (&left, &[&base]),
                (&right, &[&base]),
                (&base, &[]),
            ]),
        )
        .unwrap();
    }
}
