fn main() {
    // 嵌入的数据库迁移变化时重新编译
    println!("cargo:rerun-if-changed=migrations");
}
