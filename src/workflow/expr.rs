//! Expression interpolation for workflow values
//!
//! Workflow files may embed `${{ matrix.KEY }}` and `${{ env.KEY }}`
//! expressions in `runs-on` labels, commands, and environment values. This
//! module resolves them against the expanded matrix entry and the assembled
//! environment.

use std::collections::HashMap;

use regex::Regex;

use super::errors::WorkflowError;
use super::types::WorkflowResult;

/// Resolves `${{ matrix.* }}` and `${{ env.* }}` expressions in a string.
///
/// A reference to a matrix key that does not exist in the entry is an
/// error; an unset environment variable resolves to the empty string, like
/// a POSIX shell would. Expressions in any other scope are left untouched.
///
/// # Arguments
///
/// * `input` - The string to resolve
/// * `matrix` - Values of the matrix entry the job instance runs under
/// * `env` - The assembled environment
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use flowline::workflow::expr::interpolate;
///
/// let mut matrix = HashMap::new();
/// matrix.insert("os".to_string(), "ubuntu-22.04".to_string());
///
/// let resolved = interpolate("echo ${{ matrix.os }}", &matrix, &HashMap::new()).unwrap();
/// assert_eq!(resolved, "echo ubuntu-22.04");
/// ```
#[allow(clippy::missing_errors_doc)]
pub fn interpolate(
    input: &str,
    matrix: &HashMap<String, String>,
    env: &HashMap<String, String>,
) -> WorkflowResult<String> {
    static EXPRESSION: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
        Regex::new(r"\$\{\{\s*(matrix|env)\.([A-Za-z_][A-Za-z0-9_-]*)\s*\}\}").unwrap()
    });

    let mut output = String::with_capacity(input.len());
    let mut last = 0;

    for caps in EXPRESSION.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        let scope = caps.get(1).map_or("", |m| m.as_str());
        let key = caps.get(2).map_or("", |m| m.as_str());

        output.push_str(&input[last..whole.start()]);
        match scope {
            "matrix" => match matrix.get(key) {
                Some(value) => output.push_str(value),
                None => {
                    return Err(WorkflowError::UnknownMatrixKey {
                        key: key.to_string(),
                    });
                }
            },
            _ => output.push_str(env.get(key).map_or("", String::as_str)),
        }
        last = whole.end();
    }

    output.push_str(&input[last..]);
    Ok(output)
}
