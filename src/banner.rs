// src/banner.rs

/// Prints the application startup banner to the console.
pub fn print_banner() {
    let banner = r#"
 _____                        _____               _
| ____|___ ___  __ _ _   _   / ____|_ __ __ _  __| | ___ _ __
|  _| / __/ __|/ _` | | | | | |  __| '__/ _` |/ _` |/ _ \ '__|
| |___\__ \__ \ (_| | |_| | | |_|_ | | | (_| | (_| |  __/ |
|_____|___/___/\__,_|\__, |  \_____|_|  \__,_|\__,_|\___|_|
                     |___/

    Rubric-based Batch Essay Grading
"#;
    println!("{}", banner);
}
