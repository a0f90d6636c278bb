// Copyright (C) 2019-2026 The Nodelink Authors
// This file is part of the nodelink-tcp crate.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
// http://www.apache.org/licenses/LICENSE-2.0

// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::IoFilter;
use crate::error::Result;

/// No-op filter used when a connection carries no transport-level encryption.
#[derive(Debug, Default)]
pub struct PlainFilter;

impl IoFilter for PlainFilter {
    fn wrap(&mut self, src: &[u8]) -> Result<Vec<u8>> {
        Ok(src.to_vec())
    }

    fn unwrap<'a>(&'a mut self, src: &'a [u8]) -> Result<&'a [u8]> {
        Ok(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_and_unwrap_are_identity() {
        let mut filter = PlainFilter;
        let wrapped = filter.wrap(b"hello").unwrap();
        assert_eq!(wrapped, b"hello");
        assert_eq!(filter.unwrap(&wrapped).unwrap(), b"hello");
    }
}
