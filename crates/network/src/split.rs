// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

/// Splits `items` into the fewest lists of at most `target` items with sizes differing by at most one.
///
/// The first `len % lists` lists receive the extra item and the original order is preserved.
/// A `target` of zero is treated as one.
#[must_use]
pub fn split_evenly<T>(items: Vec<T>, target: usize) -> Vec<Vec<T>> {
    let target = target.max(1);
    let total = items.len();

    if total == 0 {
        return Vec::new();
    }

    if total <= target {
        return vec![items];
    }

    let lists = total.div_ceil(target);
    let base = total / lists;
    let extra = total % lists;

    let mut iter = items.into_iter();
    (0..lists)
        .map(|index| {
            let size = if index < extra { base + 1 } else { base };
            iter.by_ref().take(size).collect()
        })
        .collect()
}
