fn main() {
    axle_detect::cli::run();
}
