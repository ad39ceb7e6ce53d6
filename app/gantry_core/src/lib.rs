/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Core identity types for the target graph: package paths, addresses, and
//! the filesystem capability surface provided by the execution engine.

pub mod address;
pub mod fs;
pub mod package_path;
