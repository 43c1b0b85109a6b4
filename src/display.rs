use colored::*;

/// Returns the compact raw_loader logo
pub fn get_logo() -> String {
    let logo = r#"
  ____ ____ _ _ _    _    ____ ____ ___  ____ ____
  |__/ |__| | | |    |    |  | |__| |  \ |___ |__/
  |  \ |  | |_|_|    |___ |__| |  | |__/ |___ |  \
    "#;

    logo.to_string()
}

/// Returns a colored version of the logo
pub fn get_colored_logo() -> ColoredString {
    get_logo().bright_cyan()
}

/// Display version information with the ASCII art logo
pub fn display_version() {
    println!("{}", get_colored_logo());
    println!("raw_loader version {}", env!("CARGO_PKG_VERSION"));
    println!("Loads a PostgreSQL table into a partitioned DataFusion dataframe");
}
