use clap::Parser;

/// This is an attendance sign-in kiosk backed by an Excel workbook.
///
/// Without any of --sign-in, --add, --lookup or --finalize, an interactive
/// session reads names from the standard input until /quit.
#[derive(Parser, Debug, Clone, Default)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file with the kiosk settings. Values passed on the command
    /// line take precedence over the ones in this file.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, default data/attendance.xlsx) The workbook holding the registry and the
    /// attendance. It is created if it does not exist.
    #[clap(short, long, value_parser)]
    pub workbook: Option<String>,

    /// (daily or matrix, default matrix) How attendance is recorded in the workbook.
    #[clap(long, value_parser)]
    pub layout: Option<String>,

    /// (IANA name, default America/Edmonton) The timezone of the times written to the workbook.
    #[clap(long, value_parser)]
    pub timezone: Option<String>,

    /// (HH:MM, default 10:15) Sign-ins strictly after this time are flagged late.
    #[clap(long, value_parser)]
    pub late_cutoff: Option<String>,

    // One-shot actions
    /// (name) Signs in this name and exits.
    #[clap(long, value_parser)]
    pub sign_in: Option<String>,

    /// (name) Adds this name to the registry as Unregistered and exits.
    #[clap(long, value_parser)]
    pub add: Option<String>,

    /// (name) Shows the registry match or the suggestions for this name and exits.
    #[clap(long, value_parser)]
    pub lookup: Option<String>,

    /// Marks the absences of today, completes the attendance log and exits (matrix layout).
    #[clap(long, takes_value = false)]
    pub finalize: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_shot_flags() {
        let args = Args::try_parse_from([
            "attendance-kiosk",
            "--workbook",
            "book.xlsx",
            "--layout",
            "daily",
            "--sign-in",
            "Ada Lovelace",
            "--verbose",
        ])
        .unwrap();
        assert_eq!(args.workbook.as_deref(), Some("book.xlsx"));
        assert_eq!(args.layout.as_deref(), Some("daily"));
        assert_eq!(args.sign_in.as_deref(), Some("Ada Lovelace"));
        assert!(args.verbose);
        assert!(!args.finalize);
    }
}
