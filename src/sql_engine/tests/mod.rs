mod ast_utils_tests;
mod reader_tests;
