//! Utilities for creating the command line interface.

use crate::io::{OverwriteMode, Verbosity};
use clap::ArgMatches;
use indicatif::ProgressStyle;
use lazy_static::lazy_static;
use std::str::FromStr;

lazy_static! {
    static ref DEFAULT_PROGRESS_STYLE: ProgressStyle =
        ProgressStyle::default_bar().template("Step {pos}/{len} {bar:40} {percent}% | ETA: {eta}");
}

/// Parses the given argument value, exiting with a message if it is invalid.
pub fn parse_value_string<T>(argument_name: &str, value_string: &str) -> T
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    exit_on_error!(
        value_string.parse(),
        "Error: Could not parse value for {0}: {1}",
        argument_name
    )
}

pub fn get_value_from_parseable_argument_with_default<T>(
    arguments: &ArgMatches,
    argument_name: &str,
    default_value: T,
) -> T
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    match arguments.value_of(argument_name) {
        Some(value_string) => parse_value_string(argument_name, value_string),
        None => default_value,
    }
}

/// Parses every comma-separated value of the given argument, skipping empty ones.
pub fn get_values_from_parseable_argument<T>(
    arguments: &ArgMatches,
    argument_name: &str,
) -> Option<Vec<T>>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    arguments.values_of(argument_name).map(|values| {
        values
            .filter(|value_string| !value_string.is_empty())
            .map(|value_string| parse_value_string(argument_name, value_string))
            .collect()
    })
}

pub fn overwrite_mode_from_arguments(arguments: &ArgMatches) -> OverwriteMode {
    if arguments.is_present("overwrite") {
        OverwriteMode::Always
    } else if arguments.is_present("no-overwrite") {
        OverwriteMode::Never
    } else {
        OverwriteMode::Ask
    }
}

/// Determines the verbosity from the `verbose` and `progress` flags, where
/// progress reporting takes precedence when supported.
pub fn parse_verbosity(arguments: &ArgMatches, support_progress: bool) -> Verbosity {
    if support_progress && arguments.is_present("progress") {
        Verbosity::Progress(DEFAULT_PROGRESS_STYLE.clone())
    } else if arguments.is_present("verbose") {
        Verbosity::Messages
    } else {
        Verbosity::Quiet
    }
}
