//! # Shell Completion Module
//!
//! Static completion scripts through `clap_complete`, plus dynamic word lists
//! (operator names, saved mix ids). For bash and fish the generated script
//! ends with hooks that call back into the hidden `complete-operators` and
//! `complete-mixes` commands.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! mixquery completion bash > ~/.local/share/bash-completion/completions/mixquery
//!
//! # Generate zsh completions
//! mixquery completion zsh > ~/.config/zsh/completions/_mixquery
//! ```

use crate::mixes::list_mixes;
use crate::operator::OPERATORS;
use clap::Command;
use clap_complete::{generate, Shell as CompletionShell};
use rusqlite::Connection;
use std::io;

const BASH_HOOKS: &str = r#"
# Dynamic completion for mix text and saved mix ids
_mixquery_dynamic() {
    local cur prev
    if declare -F _get_comp_words_by_ref >/dev/null; then
        _get_comp_words_by_ref -n : cur prev
    else
        cur="${COMP_WORDS[COMP_CWORD]}"
        prev="${COMP_WORDS[COMP_CWORD-1]}"
    fi

    if [[ "$cur" != -* ]]; then
        case "$prev" in
            query|explain)
                COMPREPLY=($(compgen -W "$(mixquery complete-operators --shell bash 2>/dev/null)" -- "$cur"))
                compopt -o nospace 2>/dev/null
                if declare -F __ltrim_colon_completions >/dev/null; then
                    __ltrim_colon_completions "$cur"
                fi
                return 0
                ;;
            show|run|update|add|set|remove)
                if [[ " ${COMP_WORDS[*]:1:COMP_CWORD-1} " == *" mix "* ]]; then
                    COMPREPLY=($(compgen -W "$(mixquery complete-mixes --shell bash 2>/dev/null)" -- "$cur"))
                    return 0
                fi
                ;;
        esac
    fi

    _mixquery "$@"
}

complete -F _mixquery_dynamic -o bashdefault -o default mixquery
"#;

const FISH_HOOKS: &str = r#"
# Dynamic completion for mix text and saved mix ids
complete -c mixquery -f -n '__fish_seen_subcommand_from query explain' -a '(mixquery complete-operators --shell fish 2>/dev/null)'
complete -c mixquery -f -n '__fish_seen_subcommand_from mix; and __fish_seen_subcommand_from show run update add set remove' -a '(mixquery complete-mixes --shell fish 2>/dev/null)'
"#;

/// Generate shell completions for the given shell, followed by the dynamic
/// hooks where the shell has them.
pub fn generate_completions(shell: CompletionShell, cmd: &mut Command) {
    let name = cmd.get_name().to_string();
    generate(shell, cmd, name, &mut io::stdout());

    if let Some(hooks) = dynamic_completion_hooks(shell) {
        print!("{hooks}");
    }
}

/// Script appended to the generated completions so they query operators and
/// saved mixes at completion time.
#[must_use]
pub const fn dynamic_completion_hooks(shell: CompletionShell) -> Option<&'static str> {
    match shell {
        CompletionShell::Bash => Some(BASH_HOOKS),
        CompletionShell::Fish => Some(FISH_HOOKS),
        _ => None,
    }
}

/// Convert our Shell enum to clap_complete's Shell enum
#[must_use]
pub fn shell_to_completion_shell(shell: &crate::cli::Shell) -> CompletionShell {
    match shell {
        crate::cli::Shell::Bash => CompletionShell::Bash,
        crate::cli::Shell::Zsh => CompletionShell::Zsh,
        crate::cli::Shell::Fish => CompletionShell::Fish,
        crate::cli::Shell::PowerShell => CompletionShell::PowerShell,
        crate::cli::Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Operator prefixes, e.g. `lib::artist(`.
#[must_use]
pub fn operator_completions() -> Vec<String> {
    OPERATORS.iter().map(|info| format!("{}(", info.name)).collect()
}

/// `id<TAB>name` for every saved mix. A database that cannot be read yields
/// an empty list.
#[must_use]
pub fn mix_completions(conn: &Connection) -> Vec<String> {
    match list_mixes(conn) {
        Ok(mixes) => mixes.into_iter().map(|mix| format!("{}\t{}", mix.id, mix.name)).collect(),
        Err(_) => Vec::new(),
    }
}

/// Format a completion word for the given shell. Fish shows the part after
/// a tab as the description; other shells only get the word itself.
#[must_use]
pub fn format_completion(word: &str, shell: Option<&str>) -> String {
    match shell {
        // Fish handles escaping itself
        Some("fish") => word.to_string(),
        _ => {
            let word = word.split('\t').next().unwrap_or_default();
            if word.contains([' ', '\n']) {
                format!("\"{}\"", word.replace('"', "\\\""))
            } else {
                word.to_string()
            }
        }
    }
}

/// Print completion words, one per line.
pub fn print_completions(words: &[String], shell: Option<&str>) {
    for word in words {
        println!("{}", format_completion(word, shell));
    }
}
