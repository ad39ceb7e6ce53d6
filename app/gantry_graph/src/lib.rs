/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Graph resolution over the target model: address-to-target resolution,
//! sources hydration with codegen dispatch, direct-dependency resolution
//! from its four edge sources, the transitive-closure walk with cycle
//! detection, and file-ownership queries.

pub mod dependencies;
pub mod graph;
pub mod hydrate;
pub mod owners;
pub mod store;
pub mod testing;
pub mod transitive;
