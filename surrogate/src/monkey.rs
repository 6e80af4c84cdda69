//! The monkey-patch header prepended to installed task code.
//!
//! This is a textual artifact only: there is no embedded interpreter in this
//! implementation for it to act on. It is reproduced verbatim (including the
//! sentinel lines the registry uses to strip it back off on fetch), since
//! fetching installed code must hand callers back exactly the bytes they
//! submitted, independent of whatever gets prepended to the stored copy.

pub const MONKEY_START: &str = "# ---MONKEY_START---";
pub const MONKEY_END: &str = "# ---MONKEY_END---";

/// The fixed prelude. Rebinds a closed list of dangerous built-ins to raising
/// shims and restricts `open()` to a `storage/`-rooted, `..`/`~`-free path.
pub const MONKEY_HEADER: &str = "# ---MONKEY_START---
import pexecenv.monkey as monkey
open = monkey.monkey_open
def raise_error(e): raise Exception(e)
file = lambda *_: raise_error('Initialization of file objects is prohibited.')
type = lambda *_: raise_error('Usage of the type() function is prohibited.')
eval = lambda *_: raise_error('Usage of the eval() function is prohibited.')
execfile = lambda *_: raise_error('Usage of the execfile() function is prohibited.')
exit = lambda *_: raise_error('Usage of the exit() function is prohibited.')
quit = lambda *_: raise_error('Usage of the quit() function is prohibited.')
getattr = lambda *_: raise_error('Usage of the getattr() function is prohibited.')
globals = lambda *_: raise_error('Usage of the globals() function is prohibited.')
locals = lambda *_: raise_error('Usage of the locals() function is prohibited.')
help = lambda *_: raise_error('Usage of the help() function is prohibited.')
input = lambda *_: raise_error('Usage of the input() function is prohibited.')
raw_input = lambda *_: raise_error('Usage of the raw_input() function is prohibited.')
vars = lambda *_: raise_error('Usage of the vars() function is prohibited.')
compile = lambda *_: raise_error('Usage of the compile() function is prohibited.')
del monkey
# ---MONKEY_END---
";

/// Prepend the monkey header to validated task code before persistence.
pub fn wrap(code: &str) -> String {
    format!("{}{}", MONKEY_HEADER, code)
}

/// Strip the monkey header from stored code, if present.
///
/// Byte-offset based: only strips the header if the code begins with the
/// start sentinel *and* the end sentinel is found.
pub fn strip(code: &str) -> &str {
    if !code.starts_with(MONKEY_START) {
        return code;
    }
    match code.find(MONKEY_END) {
        Some(end_idx) => {
            let after_end = end_idx + MONKEY_END.len();
            // Skip the trailing newline the header emits after its closing
            // sentinel, if any, so callers get back exactly what they sent.
            let after_end = if code[after_end..].starts_with('\n') {
                after_end + 1
            } else {
                after_end
            };
            &code[after_end..]
        }
        None => code,
    }
}

/// Restricted path opener for user task code: rejects `..`/`~` traversal and
/// roots all paths under `storage/`.
///
/// Kept as a standalone, independently testable function even though this
/// implementation has no interpreter to install it into: the policy it
/// encodes, that task code can never read or write outside its sandboxed
/// storage area, is a property of the data model itself.
pub fn restrict_path(requested: &str) -> Result<std::path::PathBuf, String> {
    if requested.contains("..") || requested.contains('~') {
        return Err("Backtracking is not allowed when opening files.".to_string());
    }
    Ok(std::path::Path::new("storage").join(requested))
}
