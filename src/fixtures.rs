#[cfg(test)]
pub mod test {
    use crate::command::Command;

    pub fn strings(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    pub fn help_tokens() -> Vec<String> {
        strings(&["--help", "-h", "help"])
    }

    /// Synthetic environment for `ResolveInput`.
    pub fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Build the tree, assign `args`, and parse flags, leaving `root` ready
    /// for resolution.
    pub fn prepare(root: &mut Command, args: &[&str]) {
        root.build_tree().unwrap();
        root.assign_arguments(args);
        root.parse_flags().unwrap();
    }

    #[test]
    fn prepare_activates_the_selected_path() {
        let mut root = Command::new("main").subcommand(Command::new("server"));
        prepare(&mut root, &["server"]);
        let names: Vec<&str> = root
            .active_commands()
            .iter()
            .map(|c| c.expanded_name())
            .collect();
        assert_eq!(names, vec!["main", "main.server"]);
    }
}
