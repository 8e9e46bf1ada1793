use std::env;
use std::path::PathBuf;

use teotil_report::export::inspect_workbook;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let file_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        eprintln!("Usage: {} <workbook.xlsx>", args[0]);
        std::process::exit(2);
    };

    println!("Opening workbook: {}", file_path.display());
    let sheets = inspect_workbook(&file_path)?;

    println!("\n{}", "=".repeat(60));
    println!("{:>3}  {:<40} {:>6} {:>6}", "#", "Sheet", "Rows", "Cols");
    println!("{}", "=".repeat(60));
    for (i, sheet) in sheets.iter().enumerate() {
        println!(
            "{:>3}  {:<40} {:>6} {:>6}",
            i, sheet.name, sheet.rows, sheet.columns
        );
    }
    println!("{}", "=".repeat(60));
    println!("Total: {} sheets", sheets.len());

    Ok(())
}
