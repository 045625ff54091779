use crate::config::ProcessConfig;
use crate::error::TplError;
use crate::render::{render_flags, render_stream};
use crate::template::{extract_variables, TemplateSet, VariableDescriptor};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::io::{Read, Write};

/// Hidden positional that swallows stray arguments in streaming mode
const IGNORED_ARGS: &str = "ignored";

/// A template exposed on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct Subcommand {
    /// Template name, used verbatim as the subcommand name
    pub name: String,
    /// One required flag per entry; empty in streaming mode
    pub flags: Vec<VariableDescriptor>,
}

/// Decide which templates become subcommands and with which flags.
///
/// Templates with no discovered variables get no subcommand at all.
pub fn synthesize(config: &ProcessConfig, set: &TemplateSet) -> Vec<Subcommand> {
    let mut subcommands = Vec::new();

    for template in set.templates() {
        let variables = extract_variables(template);
        if variables.is_empty() {
            tracing::info!(
                template = %template.name,
                "template references no variables, no subcommand registered"
            );
            continue;
        }

        tracing::debug!(
            template = %template.name,
            variables = ?variables
                .iter()
                .map(|v| format!("{}:{}", v.name, v.kind))
                .collect::<Vec<_>>(),
            "discovered variables"
        );

        let flags = if config.streaming { Vec::new() } else { variables };
        subcommands.push(Subcommand {
            name: template.name.clone(),
            flags,
        });
    }

    subcommands
}

/// Build the root command with one subcommand per entry of `subcommands`
pub fn build_cli(config: &ProcessConfig, subcommands: &[Subcommand]) -> Command {
    let mut cli = Command::new("tplcmd")
        .about("Template glob lister and renderer.")
        .version(clap::crate_version!())
        .subcommand_required(true)
        .arg_required_else_help(true);
    // A template called "help" replaces the generated help subcommand
    if subcommands.iter().any(|subcommand| subcommand.name == "help") {
        cli = cli.disable_help_subcommand(true);
    }

    for subcommand in subcommands {
        cli = cli.subcommand(subcommand_command(config, subcommand));
    }
    cli
}

fn subcommand_command(config: &ProcessConfig, subcommand: &Subcommand) -> Command {
    let cmd = Command::new(subcommand.name.clone());

    if config.streaming {
        return cmd
            .about(format!(
                "Render {} once per object of a JSON array read from stdin",
                subcommand.name
            ))
            .disable_help_flag(true)
            .arg(
                Arg::new(IGNORED_ARGS)
                    .num_args(0..)
                    .trailing_var_arg(true)
                    .allow_hyphen_values(true)
                    .action(ArgAction::Append)
                    .hide(true),
            );
    }

    let mut cmd = cmd.about(format!("Render {} from flag values", subcommand.name));
    // A variable called "help" takes over the long flag
    if subcommand.flags.iter().any(|flag| flag.name == "help") {
        cmd = cmd.disable_help_flag(true);
    }

    for flag in &subcommand.flags {
        cmd = cmd.arg(
            Arg::new(flag.name.clone())
                .long(flag.name.clone())
                .required(true)
                .value_name(flag.kind.value_name())
                .help(flag.kind.help())
                .action(ArgAction::Set),
        );
    }
    cmd
}

/// Run the renderer for the subcommand selected in `matches`
pub fn dispatch<R, W>(
    config: &ProcessConfig,
    set: &TemplateSet,
    subcommands: &[Subcommand],
    matches: &ArgMatches,
    input: R,
    out: &mut W,
) -> Result<(), TplError>
where
    R: Read,
    W: Write,
{
    let (name, sub_matches) = matches
        .subcommand()
        .ok_or_else(|| TplError::Usage("no subcommand given".to_string()))?;
    let subcommand = subcommands
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| TplError::Usage(format!("unknown subcommand '{}'", name)))?;

    if config.streaming {
        let records = render_stream(set, &subcommand.name, input, out)?;
        tracing::debug!(template = name, records, "stream finished");
        return Ok(());
    }

    render_flags(
        set,
        &subcommand.name,
        &subcommand.flags,
        |flag| sub_matches.get_one::<String>(flag).map(String::as_str),
        out,
    )
}
